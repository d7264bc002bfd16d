//! System-wide metrics parsed from the /proc filesystem.
//!
//! This module provides parsers for the two system-level sources the monitor
//! needs: `/proc/meminfo` (RAM and swap totals, used RAM) and the aggregate
//! CPU line of `/proc/stat`. Reading the files is done by
//! [`crate::source::ProcFs`]; the functions here work on file content so
//! they can be tested without a live /proc.

use crate::error::MonitorError;
use crate::process::memory::parse_kb_value;

/// Source name used in error messages for /proc/meminfo.
pub const MEMINFO: &str = "/proc/meminfo";

/// Leading token of the aggregate CPU line in /proc/stat.
///
/// The trailing space keeps per-core lines (`cpu0`, `cpu1`, ...) from
/// matching.
const AGGREGATE_CPU_PREFIX: &str = "cpu ";

/// Index of the idle counter among the numeric fields of the CPU line.
const IDLE_FIELD: usize = 3;

/// Installed RAM and swap, read once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryTotals {
    pub ram_total_kb: u64,
    pub swap_total_kb: u64,
}

/// Cumulative CPU tick counters from the aggregate /proc/stat line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTicks {
    /// Sum of every numeric field on the line.
    pub total: u64,
    /// Fourth numeric field (idle).
    pub idle: u64,
}

/// Looks up `keys` in meminfo-style content (`Key: value kB`).
///
/// Each key must include its trailing colon. A key matches only at the start
/// of a line, so `Cached:` does not match `SwapCached:`.
pub fn parse_meminfo<const N: usize>(content: &str, keys: [&str; N]) -> [Option<u64>; N] {
    let mut values = [None; N];
    let mut found = 0;

    for line in content.lines() {
        for (idx, key) in keys.iter().enumerate() {
            if values[idx].is_some() {
                continue;
            }
            if let Some(rest) = line.strip_prefix(key) {
                if let Some(kb) = parse_kb_value(rest) {
                    values[idx] = Some(kb);
                    found += 1;
                }
                break;
            }
        }
        if found == N {
            break;
        }
    }

    values
}

/// Parses `MemTotal:` and `SwapTotal:`. Both are required.
pub fn parse_memory_totals(content: &str) -> Result<MemoryTotals, MonitorError> {
    match parse_meminfo(content, ["MemTotal:", "SwapTotal:"]) {
        [Some(ram_total_kb), Some(swap_total_kb)] => Ok(MemoryTotals {
            ram_total_kb,
            swap_total_kb,
        }),
        _ => Err(MonitorError::unavailable(
            MEMINFO,
            "MemTotal or SwapTotal missing",
        )),
    }
}

/// Computes used RAM as `total - free - buffers - cached`.
///
/// The result is signed and not clamped; a well-formed kernel source never
/// makes it negative. Figures that do not fit `i64` are reported as an
/// unavailable source.
pub fn parse_ram_used(content: &str, ram_total_kb: u64) -> Result<i64, MonitorError> {
    match parse_meminfo(content, ["MemFree:", "Buffers:", "Cached:"]) {
        [Some(free), Some(buffers), Some(cached)] => {
            used_kb(ram_total_kb, free, buffers, cached)
                .ok_or_else(|| MonitorError::unavailable(MEMINFO, "memory figures out of range"))
        }
        _ => Err(MonitorError::unavailable(
            MEMINFO,
            "MemFree, Buffers or Cached missing",
        )),
    }
}

fn used_kb(total: u64, free: u64, buffers: u64, cached: u64) -> Option<i64> {
    let total = i64::try_from(total).ok()?;
    [free, buffers, cached].into_iter().try_fold(total, |used, kb| {
        used.checked_sub(i64::try_from(kb).ok()?)
    })
}

/// Parses the aggregate CPU line of /proc/stat.
///
/// Numeric fields are summed until the first non-numeric token. A missing
/// line, one with fewer than four numeric fields, or one whose sum
/// overflows yields zero ticks.
pub fn parse_cpu_ticks(content: &str) -> CpuTicks {
    let Some(line) = content
        .lines()
        .find(|l| l.starts_with(AGGREGATE_CPU_PREFIX))
    else {
        return CpuTicks::default();
    };

    let mut ticks = CpuTicks::default();
    let mut fields = 0;
    for value in line[AGGREGATE_CPU_PREFIX.len()..]
        .split_whitespace()
        .map_while(|f| f.parse::<u64>().ok())
    {
        if fields == IDLE_FIELD {
            ticks.idle = value;
        }
        let Some(total) = ticks.total.checked_add(value) else {
            return CpuTicks::default();
        };
        ticks.total = total;
        fields += 1;
    }

    if fields <= IDLE_FIELD {
        return CpuTicks::default();
    }
    ticks
}
