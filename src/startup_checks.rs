//! Startup requirement validation for herakles-mem-cpu-monitor.
//!
//! This module validates that the monitor can read the sources it depends on
//! before the first round is taken.

use herakles_mem_cpu_monitor::cpufreq::TIME_IN_STATE;
use herakles_mem_cpu_monitor::watermark::{HIGH_WATERMARK, LOW_WATERMARK};
use nix::unistd::geteuid;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{error, info, warn};

/// Validate all runtime requirements
pub fn validate_requirements(
    proc_root: &Path,
    sys_root: &Path,
    pids: &[u32],
) -> Result<(), ValidationError> {
    info!("🔍 Validating runtime requirements...");

    check_user_privileges();
    check_system_sources(proc_root)?;
    for &pid in pids {
        check_process_access(proc_root, pid);
    }
    check_optional_sources(sys_root);

    info!("✅ All runtime requirements validated");
    Ok(())
}

/// Check if running with sufficient privileges
fn check_user_privileges() {
    if !geteuid().is_root() {
        info!("Not running as root - memory maps of foreign processes may be unreadable");
    } else {
        info!("✅ Running as root (uid=0)");
    }
}

/// meminfo is required; the CPU line only degrades to 0 %.
fn check_system_sources(proc_root: &Path) -> Result<(), ValidationError> {
    let meminfo = proc_root.join("meminfo");
    if let Err(e) = fs::read_to_string(&meminfo) {
        error!("❌ Cannot read {}: {}", meminfo.display(), e);
        return Err(ValidationError::MeminfoUnreadable(format!(
            "{}: {}",
            meminfo.display(),
            e
        )));
    }
    info!("✅ {} readable", meminfo.display());

    let stat = proc_root.join("stat");
    match fs::metadata(&stat) {
        Ok(_) => info!("✅ {} readable", stat.display()),
        Err(e) => {
            warn!("⚠️  Cannot access {}: {}", stat.display(), e);
            warn!("   System CPU usage will be reported as 0");
        }
    }
    Ok(())
}

/// Unreadable processes are reported with zero values, so this only warns.
fn check_process_access(proc_root: &Path, pid: u32) {
    let smaps = proc_root.join(pid.to_string()).join("smaps");
    match fs::File::open(&smaps) {
        Ok(_) => info!("✅ PID {}: memory maps readable", pid),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            warn!("⚠️  PID {}: cannot read {} - insufficient permissions", pid, smaps.display());
            warn!("   Memory of this process will be reported as 0");
            warn!("   Solution: run as the process owner or as root");
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("⚠️  PID {}: no such process", pid);
        }
        Err(e) => {
            warn!("⚠️  PID {}: could not test {}: {}", pid, smaps.display(), e);
        }
    }
}

fn check_optional_sources(sys_root: &Path) {
    if sys_root.join(LOW_WATERMARK).exists() && sys_root.join(HIGH_WATERMARK).exists() {
        info!("✅ Memory watermark flags available");
    } else {
        info!("Memory watermark flags not available - column disabled");
    }

    if sys_root.join(TIME_IN_STATE).exists() {
        info!("✅ cpufreq statistics available");
    } else {
        info!("cpufreq statistics not available - MHz column will read 0");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Memory information not readable: {0}")]
    MeminfoUnreadable(String),
}
