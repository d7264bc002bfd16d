//! Display name resolution for monitored processes.
//!
//! The command line is preferred over `comm`: launchers and interpreters make
//! the executable name meaningless. Kernel threads have an empty command
//! line, so they fall back to the bracketed `Name:` from /proc/<pid>/status.

use std::fs;
use std::path::Path;

/// Placeholder shown when no name could be resolved.
pub const UNKNOWN_PROCESS_NAME: &str = "<unknown>";

/// Formats a NUL-separated /proc/<pid>/cmdline as a single line.
///
/// The directory part of argument 0 is stripped; arguments are joined with
/// spaces. Returns `None` for an empty command line.
pub fn format_cmdline(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\0").unwrap_or(raw);
    if raw.is_empty() {
        return None;
    }

    let mut args = raw.split(|&b| b == 0);
    let argv0 = args.next()?;
    let program = match argv0.iter().rposition(|&b| b == b'/') {
        Some(slash) => &argv0[slash + 1..],
        None => argv0,
    };

    let mut line = String::from_utf8_lossy(program).into_owned();
    for arg in args {
        line.push(' ');
        line.push_str(&String::from_utf8_lossy(arg));
    }
    Some(line)
}

/// Extracts `[name]` from the first line of /proc/<pid>/status.
pub fn format_status_name(status: &str) -> Option<String> {
    let name = status.lines().next()?.strip_prefix("Name:")?.trim();
    if name.is_empty() {
        return None;
    }
    Some(format!("[{name}]"))
}

/// Resolves a display name for the process whose /proc directory is `proc_path`.
pub fn read_process_name(proc_path: &Path) -> Option<String> {
    if let Ok(raw) = fs::read(proc_path.join("cmdline")) {
        if let Some(name) = format_cmdline(&raw) {
            return Some(name);
        }
    }

    fs::read_to_string(proc_path.join("status"))
        .ok()
        .and_then(|status| format_status_name(&status))
}
