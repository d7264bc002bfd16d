//! Sampling loop controller.
//!
//! A [`Monitor`] walks through `Init -> WarmingUp -> Steady -> Draining -> Done`.
//! Construction is `Init`: it reads the memory totals, registers the
//! requested processes and probes the watermark files. [`Monitor::run`] takes
//! the baseline sample, then repeatedly reports the current round, sleeps and
//! samples the next one until shutdown is requested or the round budget is
//! spent.
//!
//! Shutdown is polled before each round is reported, right after the sleep,
//! and between processes while sampling. A forced request returns
//! [`RunOutcome::Forced`] without draining.

use std::mem;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, info};

use crate::cpufreq::FreqSnapshot;
use crate::delta::{cpu_tick_delta, cpu_usage_percent, memory_delta, process_cpu_percent};
use crate::error::MonitorError;
use crate::process::ProcessRegistry;
use crate::report::{ChangeFilter, ProcessReport, ReportFilter, RoundReport, RoundSink, RunSummary};
use crate::shutdown::CancellationToken;
use crate::source::MetricSource;
use crate::system::{CpuTicks, MemoryTotals};

/// Longest uninterrupted stretch of the inter-round sleep.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    WarmingUp,
    Steady,
    Draining,
    Done,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Stopped on request or after the round budget, resources released.
    Completed,
    /// Stopped on a repeated shutdown request without releasing anything.
    Forced,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub filter: ChangeFilter,
    /// Stop after this many reported rounds.
    pub max_rounds: Option<u64>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            filter: ChangeFilter::default(),
            max_rounds: None,
        }
    }
}

/// System-wide accumulators for the current and the previous round.
#[derive(Debug, Default)]
struct SystemState {
    used_kb: i64,
    prev_used_kb: i64,
    ticks: CpuTicks,
    prev_ticks: CpuTicks,
    freq: FreqSnapshot,
    /// Snapshot of the last reported round, not the last sampled one.
    prev_freq: FreqSnapshot,
}

enum Checkpoint {
    Continue,
    Stop,
    Forced,
}

/// Drives the periodic sampling of one [`MetricSource`].
pub struct Monitor<S: MetricSource> {
    source: S,
    settings: MonitorSettings,
    cancel: CancellationToken,
    registry: ProcessRegistry,
    totals: MemoryTotals,
    watermarks_available: bool,
    system: SystemState,
    filter: ReportFilter,
    report: RoundReport,
    rounds_reported: u64,
    phase: Phase,
}

impl<S: MetricSource> Monitor<S> {
    /// Prepares a run over `pids`, in the given order.
    ///
    /// Fails when the memory totals cannot be read or a PID is rejected.
    pub fn new(
        mut source: S,
        settings: MonitorSettings,
        pids: &[u32],
        cancel: CancellationToken,
    ) -> Result<Self, MonitorError> {
        let totals = source.read_system_totals()?;
        debug!(
            "System totals: {} kB RAM, {} kB swap",
            totals.ram_total_kb, totals.swap_total_kb
        );

        let mut registry = ProcessRegistry::new();
        for &pid in pids {
            registry.register(pid, &mut source)?;
        }

        let watermarks_available = source.watermarks_available();
        if watermarks_available {
            debug!("Memory watermark flags available");
        }

        let filter = ReportFilter::new(settings.filter, !registry.is_empty());
        let report = RoundReport {
            processes: Vec::with_capacity(registry.len()),
            ..RoundReport::default()
        };

        Ok(Self {
            source,
            settings,
            cancel,
            registry,
            totals,
            watermarks_available,
            system: SystemState::default(),
            filter,
            report,
            rounds_reported: 0,
            phase: Phase::Init,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn totals(&self) -> MemoryTotals {
        self.totals
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn rounds_reported(&self) -> u64 {
        self.rounds_reported
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Runs until shutdown or until the round budget is spent.
    ///
    /// Every reported round is complete: one entry per registered process,
    /// in registration order. Errors end the run after draining.
    pub fn run<K: RoundSink + ?Sized>(&mut self, sink: &mut K) -> Result<RunOutcome, MonitorError> {
        let outcome = self.run_rounds(sink);
        match outcome {
            Ok(RunOutcome::Forced) => {
                info!("Forced shutdown, skipping cleanup");
                self.set_phase(Phase::Done);
            }
            _ => {
                self.drain();
            }
        }
        outcome
    }

    fn run_rounds<K: RoundSink + ?Sized>(&mut self, sink: &mut K) -> Result<RunOutcome, MonitorError> {
        sink.start(&RunSummary {
            totals: self.totals,
            processes: self.registry.as_slice(),
            watermarks_available: self.watermarks_available,
        })?;

        match self.checkpoint() {
            Checkpoint::Continue => {}
            Checkpoint::Stop => return Ok(RunOutcome::Completed),
            Checkpoint::Forced => return Ok(RunOutcome::Forced),
        }

        self.set_phase(Phase::WarmingUp);
        self.warm_up()?;
        self.set_phase(Phase::Steady);

        loop {
            match self.checkpoint() {
                Checkpoint::Continue => {}
                Checkpoint::Stop => return Ok(RunOutcome::Completed),
                Checkpoint::Forced => return Ok(RunOutcome::Forced),
            }

            self.build_report();
            if self.filter.should_emit(&self.report) {
                sink.emit(&self.report)?;
                self.rounds_reported += 1;
                mem::swap(&mut self.system.prev_freq, &mut self.system.freq);
                if self
                    .settings
                    .max_rounds
                    .is_some_and(|max| self.rounds_reported >= max)
                {
                    info!("Reported {} rounds, stopping", self.rounds_reported);
                    return Ok(RunOutcome::Completed);
                }
            }

            self.sleep();

            match self.checkpoint() {
                Checkpoint::Continue => {}
                Checkpoint::Stop => return Ok(RunOutcome::Completed),
                Checkpoint::Forced => return Ok(RunOutcome::Forced),
            }

            self.sample_round()?;
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        debug!("Monitor phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    fn checkpoint(&self) -> Checkpoint {
        if self.cancel.is_forced() {
            Checkpoint::Forced
        } else if self.cancel.is_cancelled() {
            Checkpoint::Stop
        } else {
            Checkpoint::Continue
        }
    }

    /// Baseline sample: seeds the previous values and zeroes every delta.
    fn warm_up(&mut self) -> Result<(), MonitorError> {
        self.read_round()?;

        let sys = &mut self.system;
        sys.prev_used_kb = sys.used_kb;
        sys.prev_ticks = sys.ticks;
        sys.prev_freq.clone_from(&sys.freq);
        self.registry.reset_deltas();

        self.filter.prime(sys.used_kb, 0.0);
        Ok(())
    }

    /// Moves current values to previous, then reads a new round.
    fn sample_round(&mut self) -> Result<(), MonitorError> {
        let sys = &mut self.system;
        sys.prev_used_kb = sys.used_kb;
        sys.prev_ticks = sys.ticks;
        self.read_round()
    }

    /// System memory and CPU first, then every process in order.
    fn read_round(&mut self) -> Result<(), MonitorError> {
        self.system.used_kb = self.source.read_system_used(self.totals.ram_total_kb)?;
        self.system.ticks = self.source.read_system_cpu_ticks();
        self.source.read_cpu_freq(&mut self.system.freq);
        self.registry.update_all(&mut self.source, &self.cancel);
        Ok(())
    }

    /// Fills the reusable report buffer from the current state.
    fn build_report(&mut self) {
        let sys = &self.system;
        let total_delta = cpu_tick_delta(sys.prev_ticks.total, sys.ticks.total);
        let idle_delta = cpu_tick_delta(sys.prev_ticks.idle, sys.ticks.idle);

        let report = &mut self.report;
        report.timestamp = Local::now();
        report.watermarks = self
            .watermarks_available
            .then(|| self.source.read_watermarks());
        report.system_used_kb = sys.used_kb;
        report.system_used_delta = memory_delta(sys.prev_used_kb, sys.used_kb);
        report.system_cpu_percent = cpu_usage_percent(total_delta, idle_delta);
        report.cpu_freq_mhz = if sys.prev_freq.is_empty() {
            0
        } else {
            sys.freq.average_mhz_since(&sys.prev_freq)
        };

        report.processes.clear();
        report.processes.extend(self.registry.iter().map(|p| {
            let memory = p.memory();
            ProcessReport {
                pid: p.pid(),
                clean_kb: memory.clean_kb,
                dirty_kb: memory.dirty_kb,
                mem_delta: p.mem_change(),
                cpu_tick_delta: p.cputicks_change(),
                cpu_percent: process_cpu_percent(total_delta, p.cputicks_change()),
            }
        }));
    }

    /// Sleeps for the interval in slices, returning early on shutdown.
    fn sleep(&self) {
        let deadline = Instant::now() + self.settings.interval;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }

    fn drain(&mut self) {
        self.set_phase(Phase::Draining);
        self.registry.clear();
        self.report.processes = Vec::new();
        self.system = SystemState::default();
        self.source.release();
        self.set_phase(Phase::Done);
    }
}
