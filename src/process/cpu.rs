//! CPU tick parsing for /proc/<pid>/stat.
//!
//! The stat line starts with `pid (comm) state ...`. `comm` may contain
//! spaces and parentheses, so field counting resumes after the last `)`.

/// 1-based position of `utime` on the stat line, counting `comm` as one field.
///
/// The monitor depends on the kernel keeping `utime` and `stime` at these
/// positions. Fields were only ever appended to the line since Linux 2.6, but
/// a change before these positions would silently break the per-process CPU
/// figures.
pub const UTIME_FIELD: usize = 14;
/// 1-based position of `stime`.
pub const STIME_FIELD: usize = 15;

/// Fields preceding the first one after `comm` (pid, comm, state is next).
const FIELDS_BEFORE_STATE: usize = 2;

/// Returns `utime + stime` in clock ticks, or 0 when the line is malformed
/// or the sum overflows.
pub fn parse_stat_ticks(stat: &[u8]) -> u64 {
    let Some(close) = stat.iter().rposition(|&b| b == b')') else {
        return 0;
    };
    let Ok(rest) = std::str::from_utf8(&stat[close + 1..]) else {
        return 0;
    };

    // `rest` starts with the state field, 1-based position 3.
    let mut fields = rest.split_whitespace();
    let utime = fields
        .nth(UTIME_FIELD - FIELDS_BEFORE_STATE - 1)
        .and_then(|f| f.parse::<u64>().ok());
    let stime = fields.next().and_then(|f| f.parse::<u64>().ok());

    match (utime, stime) {
        (Some(u), Some(s)) => u.checked_add(s).unwrap_or(0),
        _ => 0,
    }
}
