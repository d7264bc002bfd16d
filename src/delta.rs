//! Delta and rate calculation between two consecutive samples.
//!
//! All counters are sampled once per round; these helpers turn the previous
//! and current values into the per-round figures that get reported.

/// Signed change of a memory figure in kilobytes. Saturates at the `i64`
/// bounds and is otherwise not clamped.
pub fn memory_delta(prev_kb: i64, curr_kb: i64) -> i64 {
    curr_kb.saturating_sub(prev_kb)
}

/// Change of a cumulative tick counter.
///
/// A counter that went backwards (the process died, or its PID was reused by
/// a younger process) yields 0 instead of wrapping around.
pub fn cpu_tick_delta(prev: u64, curr: u64) -> u64 {
    if curr >= prev {
        curr - prev
    } else {
        0
    }
}

/// CPU usage in percent over one round.
///
/// No elapsed ticks reads as 0 %, no idle ticks as 100 %. Jitter above
/// 100 % is clamped.
pub fn cpu_usage_percent(total_ticks: u64, idle_ticks: u64) -> f32 {
    if total_ticks == 0 {
        return 0.0;
    }
    if idle_ticks == 0 {
        return 100.0;
    }
    let busy = total_ticks.saturating_sub(idle_ticks);
    let percent = 100.0 * (busy as f32 / total_ticks as f32);
    percent.min(100.0)
}

/// Share of all system ticks elapsed during the round that the process used.
///
/// The denominator is the system-wide tick delta, summed over every core, so
/// a single-threaded process pegging one of four cores reports about 25 %.
pub fn process_cpu_percent(system_total_ticks: u64, process_ticks: u64) -> f32 {
    cpu_usage_percent(
        system_total_ticks,
        system_total_ticks.saturating_sub(process_ticks),
    )
}
