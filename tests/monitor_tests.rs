//! Integration tests for the sampling loop.
//!
//! These tests run `Monitor` against a synthetic /proc and /sys tree in a
//! temporary directory and check the reported rounds.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use herakles_mem_cpu_monitor::cpufreq::{FreqSnapshot, TIME_IN_STATE};
use herakles_mem_cpu_monitor::monitor::{Monitor, MonitorSettings, Phase, RunOutcome};
use herakles_mem_cpu_monitor::process::PrivateMemory;
use herakles_mem_cpu_monitor::report::{
    ChangeFilter, RoundReport, RoundSink, RunSummary, TableReporter,
};
use herakles_mem_cpu_monitor::shutdown::CancellationToken;
use herakles_mem_cpu_monitor::source::{MetricSource, ProcFs, ProcessPaths};
use herakles_mem_cpu_monitor::system::{CpuTicks, MemoryTotals};
use herakles_mem_cpu_monitor::watermark::{WatermarkFlags, HIGH_WATERMARK, LOW_WATERMARK};
use herakles_mem_cpu_monitor::MonitorError;
use tempfile::{tempdir, TempDir};

/// Synthetic proc and sys trees.
struct FakeSystem {
    dir: TempDir,
}

impl FakeSystem {
    fn new() -> Self {
        let dir = tempdir().expect("Failed to create temp dir");
        fs::create_dir_all(dir.path().join("proc")).unwrap();
        fs::create_dir_all(dir.path().join("sys")).unwrap();
        let system = Self { dir };
        system.set_free_kb(200000);
        system.set_cpu(200, 800);
        system
    }

    fn proc_root(&self) -> PathBuf {
        self.dir.path().join("proc")
    }

    fn sys_root(&self) -> PathBuf {
        self.dir.path().join("sys")
    }

    fn source(&self) -> ProcFs {
        ProcFs::new(self.proc_root(), self.sys_root(), 4)
    }

    fn set_free_kb(&self, free_kb: u64) {
        let meminfo = format!(
            "MemTotal:         262144 kB\n\
             MemFree:          {free_kb} kB\n\
             MemAvailable:     230000 kB\n\
             Buffers:            1000 kB\n\
             Cached:             2000 kB\n\
             SwapCached:          500 kB\n\
             SwapTotal:        768000 kB\n\
             SwapFree:         768000 kB\n"
        );
        fs::write(self.proc_root().join("meminfo"), meminfo).unwrap();
    }

    /// Writes the aggregate CPU line with `busy` user ticks and `idle` ticks.
    fn set_cpu(&self, busy: u64, idle: u64) {
        let stat = format!(
            "cpu  {busy} 0 0 {idle} 0 0 0 0 0\n\
             cpu0 {busy} 0 0 {idle} 0 0 0 0 0\n\
             intr 12345\n"
        );
        fs::write(self.proc_root().join("stat"), stat).unwrap();
    }

    fn add_process(&self, pid: u32, cmdline: &[u8], clean_kb: u64, dirty_kb: u64, ticks: u64) {
        let dir = self.proc_root().join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("cmdline"), cmdline).unwrap();
        fs::write(dir.join("status"), "Name:\tfake\n").unwrap();
        self.set_memory(pid, clean_kb, dirty_kb);
        self.set_ticks(pid, ticks);
    }

    fn set_memory(&self, pid: u32, clean_kb: u64, dirty_kb: u64) {
        let smaps = format!(
            "00400000-0040c000 r-xp 00000000 08:01 1234   /usr/bin/fake\n\
             Size:                 48 kB\n\
             Private_Clean:        {clean_kb} kB\n\
             Private_Dirty:        {dirty_kb} kB\n\
             Swap:                  0 kB\n"
        );
        fs::write(self.proc_root().join(pid.to_string()).join("smaps"), smaps).unwrap();
    }

    /// Splits `ticks` evenly between utime and stime.
    fn set_ticks(&self, pid: u32, ticks: u64) {
        let utime = ticks / 2;
        let stime = ticks - utime;
        let stat = format!(
            "{pid} (fake proc) S 1 {pid} {pid} 0 -1 4194304 100 0 0 0 {utime} {stime} 0 0 20 0 1 0 12345 12345678 1234\n"
        );
        fs::write(self.proc_root().join(pid.to_string()).join("stat"), stat).unwrap();
    }

    fn remove_process(&self, pid: u32) {
        fs::remove_dir_all(self.proc_root().join(pid.to_string())).unwrap();
    }

    fn set_watermarks(&self, low: &str, high: &str) {
        let sys = self.sys_root();
        fs::create_dir_all(sys.join("kernel")).unwrap();
        fs::write(sys.join(LOW_WATERMARK), low).unwrap();
        fs::write(sys.join(HIGH_WATERMARK), high).unwrap();
    }

    fn set_time_in_state(&self, content: &str) {
        let path = self.sys_root().join(TIME_IN_STATE);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

/// Wraps `ProcFs`, counting reads and running a hook at the start of every
/// sampled round (0 is the baseline).
struct HookedSource<F: FnMut(usize)> {
    inner: ProcFs,
    reads: Arc<AtomicUsize>,
    process_reads: usize,
    round: usize,
    on_round: F,
}

impl<F: FnMut(usize)> HookedSource<F> {
    fn new(inner: ProcFs, on_round: F) -> Self {
        Self {
            inner,
            reads: Arc::new(AtomicUsize::new(0)),
            process_reads: 0,
            round: 0,
            on_round,
        }
    }

    fn count(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }
}

impl<F: FnMut(usize)> MetricSource for HookedSource<F> {
    fn read_system_totals(&mut self) -> Result<MemoryTotals, MonitorError> {
        self.inner.read_system_totals()
    }

    fn read_system_used(&mut self, ram_total_kb: u64) -> Result<i64, MonitorError> {
        (self.on_round)(self.round);
        self.round += 1;
        self.count();
        self.inner.read_system_used(ram_total_kb)
    }

    fn read_system_cpu_ticks(&mut self) -> CpuTicks {
        self.count();
        self.inner.read_system_cpu_ticks()
    }

    fn process_paths(&self, pid: u32) -> ProcessPaths {
        self.inner.process_paths(pid)
    }

    fn read_process_name(&mut self, paths: &ProcessPaths) -> Option<String> {
        self.inner.read_process_name(paths)
    }

    fn read_process_memory(&mut self, smaps: &Path) -> PrivateMemory {
        self.count();
        self.process_reads += 1;
        self.inner.read_process_memory(smaps)
    }

    fn read_process_cpu_ticks(&mut self, stat: &Path) -> u64 {
        self.count();
        self.process_reads += 1;
        self.inner.read_process_cpu_ticks(stat)
    }

    fn watermarks_available(&mut self) -> bool {
        self.inner.watermarks_available()
    }

    fn read_watermarks(&mut self) -> WatermarkFlags {
        self.count();
        self.inner.read_watermarks()
    }

    fn read_cpu_freq(&mut self, snapshot: &mut FreqSnapshot) {
        self.count();
        self.inner.read_cpu_freq(snapshot)
    }

    fn release(&mut self) {
        self.inner.release()
    }
}

/// Collects every emitted round, calling `on_emit` with its index.
struct Collect<F: FnMut(usize)> {
    rounds: Vec<RoundReport>,
    on_emit: F,
}

fn collect() -> Collect<fn(usize)> {
    Collect {
        rounds: Vec::new(),
        on_emit: |_| {},
    }
}

impl<F: FnMut(usize)> RoundSink for Collect<F> {
    fn start(&mut self, _summary: &RunSummary<'_>) -> std::io::Result<()> {
        Ok(())
    }

    fn emit(&mut self, round: &RoundReport) -> std::io::Result<()> {
        self.rounds.push(round.clone());
        (self.on_emit)(self.rounds.len() - 1);
        Ok(())
    }
}

fn settings(max_rounds: u64) -> MonitorSettings {
    MonitorSettings {
        interval: Duration::ZERO,
        filter: ChangeFilter::default(),
        max_rounds: Some(max_rounds),
    }
}

#[test]
fn test_system_figures() {
    let system = FakeSystem::new();
    let source = HookedSource::new(system.source(), |round| {
        if round == 1 {
            system.set_free_kb(199000);
            // 100 busy + 300 idle ticks elapsed
            system.set_cpu(300, 1100);
        }
    });

    let mut monitor = Monitor::new(source, settings(2), &[], CancellationToken::new()).unwrap();
    assert_eq!(
        monitor.totals(),
        MemoryTotals {
            ram_total_kb: 262144,
            swap_total_kb: 768000
        }
    );

    let mut sink = collect();
    assert_eq!(monitor.run(&mut sink).unwrap(), RunOutcome::Completed);
    assert_eq!(sink.rounds.len(), 2);

    let baseline = &sink.rounds[0];
    assert_eq!(baseline.system_used_kb, 59144);
    assert_eq!(baseline.system_used_delta, 0);
    assert_eq!(baseline.system_cpu_percent, 0.0);
    assert!(baseline.watermarks.is_none());
    assert!(baseline.processes.is_empty());

    let next = &sink.rounds[1];
    assert_eq!(next.system_used_kb, 60144);
    assert_eq!(next.system_used_delta, 1000);
    assert!((next.system_cpu_percent - 25.0).abs() < 0.001);
}

#[test]
fn test_process_exit_reports_single_drop() {
    let system = FakeSystem::new();
    system.add_process(4242, b"/usr/bin/fake\0", 100, 260, 1000);
    let source = HookedSource::new(system.source(), |round| {
        if round == 1 {
            system.remove_process(4242);
        }
    });

    let mut monitor = Monitor::new(source, settings(3), &[4242], CancellationToken::new()).unwrap();
    let mut sink = collect();
    monitor.run(&mut sink).unwrap();

    let deltas: Vec<i64> = sink.rounds.iter().map(|r| r.processes[0].mem_delta).collect();
    assert_eq!(deltas, vec![0, -360, 0]);

    let gone = &sink.rounds[1].processes[0];
    assert_eq!((gone.clean_kb, gone.dirty_kb), (0, 0));
    assert_eq!(gone.cpu_tick_delta, 0);
    assert_eq!(gone.cpu_percent, 0.0);
}

#[test]
fn test_every_round_lists_every_process_in_order() {
    let system = FakeSystem::new();
    system.add_process(100, b"/bin/a\0", 10, 10, 0);
    system.add_process(300, b"/bin/c\0", 30, 30, 0);
    let pids = [100, 200, 300, 100];

    let mut monitor = Monitor::new(system.source(), settings(3), &pids, CancellationToken::new()).unwrap();
    let mut sink = collect();
    monitor.run(&mut sink).unwrap();

    assert_eq!(sink.rounds.len(), 3);
    for round in &sink.rounds {
        let listed: Vec<u32> = round.processes.iter().map(|p| p.pid).collect();
        assert_eq!(listed, pids);
        // PID 200 never existed and reads as zero
        assert_eq!(round.processes[1].clean_kb + round.processes[1].dirty_kb, 0);
        assert_eq!(round.processes[2].clean_kb, 30);
    }
}

#[test]
fn test_process_cpu_share_of_system_ticks() {
    let system = FakeSystem::new();
    system.add_process(77, b"/usr/bin/busy\0", 1, 1, 500);
    let source = HookedSource::new(system.source(), |round| {
        if round == 1 {
            // 400 system ticks elapsed, 100 of them used by PID 77
            system.set_cpu(400, 1000);
            system.set_ticks(77, 600);
        }
    });

    let mut monitor = Monitor::new(source, settings(2), &[77], CancellationToken::new()).unwrap();
    let mut sink = collect();
    monitor.run(&mut sink).unwrap();

    let p = &sink.rounds[1].processes[0];
    assert_eq!(p.cpu_tick_delta, 100);
    assert!((p.cpu_percent - 25.0).abs() < 0.001);
}

#[test]
fn test_graceful_shutdown_drains() {
    let system = FakeSystem::new();
    system.add_process(5, b"/bin/sh\0", 1, 1, 0);
    let cancel = CancellationToken::new();
    let handle = cancel.clone();

    let mut monitor = Monitor::new(system.source(), settings(10), &[5], cancel).unwrap();
    let mut sink = Collect {
        rounds: Vec::new(),
        on_emit: move |_| {
            handle.request();
        },
    };

    assert_eq!(monitor.run(&mut sink).unwrap(), RunOutcome::Completed);
    assert_eq!(sink.rounds.len(), 1);
    assert_eq!(monitor.phase(), Phase::Done);
    assert!(monitor.registry().is_empty());
}

#[test]
fn test_forced_shutdown_reads_nothing_more() {
    let system = FakeSystem::new();
    system.add_process(5, b"/bin/sh\0", 1, 1, 0);
    let cancel = CancellationToken::new();
    let handle = cancel.clone();

    let source = HookedSource::new(system.source(), |_| {});
    let reads = Arc::clone(&source.reads);
    let reads_at_request = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&reads_at_request);

    let mut monitor = Monitor::new(source, settings(10), &[5], cancel).unwrap();
    let mut sink = Collect {
        rounds: Vec::new(),
        on_emit: move |_| {
            handle.request();
            handle.request();
            seen.store(reads.load(Ordering::SeqCst), Ordering::SeqCst);
        },
    };

    assert_eq!(monitor.run(&mut sink).unwrap(), RunOutcome::Forced);
    assert_eq!(sink.rounds.len(), 1);
    assert_eq!(
        monitor.source().reads.load(Ordering::SeqCst),
        reads_at_request.load(Ordering::SeqCst)
    );
    // Forced exit skips draining
    assert_eq!(monitor.registry().len(), 1);
}

#[test]
fn test_cancel_during_system_read_emits_no_partial_round() {
    let system = FakeSystem::new();
    for pid in [1, 2, 3] {
        system.add_process(pid, b"/bin/x\0", 1, 1, 0);
    }
    let cancel = CancellationToken::new();
    let handle = cancel.clone();

    // Shutdown arrives while round 1 reads the system figures
    let source = HookedSource::new(system.source(), move |round| {
        if round == 1 {
            handle.request();
        }
    });
    let mut monitor = Monitor::new(source, settings(10), &[1, 2, 3], cancel).unwrap();

    let mut sink = collect();
    assert_eq!(monitor.run(&mut sink).unwrap(), RunOutcome::Completed);
    assert_eq!(sink.rounds.len(), 1);
    assert_eq!(sink.rounds[0].processes.len(), 3);
    // Only the baseline touched the processes
    assert_eq!(monitor.source().process_reads, 6);
}

#[test]
fn test_mem_change_filter() {
    let system = FakeSystem::new();
    system.add_process(9, b"/bin/grow\0", 100, 100, 0);
    let source = HookedSource::new(system.source(), |round| match round {
        3 => system.set_memory(9, 100, 140),
        5 => system.set_memory(9, 100, 180),
        _ => {}
    });

    let mut s = settings(2);
    s.filter.mem_changes_only = true;
    let mut monitor = Monitor::new(source, s, &[9], CancellationToken::new()).unwrap();
    let mut sink = collect();
    monitor.run(&mut sink).unwrap();

    let deltas: Vec<i64> = sink.rounds.iter().map(|r| r.processes[0].mem_delta).collect();
    assert_eq!(deltas, vec![40, 40]);
}

#[test]
fn test_system_mem_threshold_filter() {
    let system = FakeSystem::new();
    let source = HookedSource::new(system.source(), |round| match round {
        // +500 kB, below the threshold
        2 => system.set_free_kb(199500),
        // another +600 kB, 1100 kB since the baseline was reported
        4 => system.set_free_kb(198900),
        _ => {}
    });

    let mut s = settings(1);
    s.filter.system_mem_change_kb = Some(1000);
    let mut monitor = Monitor::new(source, s, &[], CancellationToken::new()).unwrap();
    let mut sink = collect();
    monitor.run(&mut sink).unwrap();

    // Reported once the drift since the baseline reaches the threshold
    assert_eq!(sink.rounds.len(), 1);
    assert_eq!(sink.rounds[0].system_used_kb, 60244);
    assert_eq!(sink.rounds[0].system_used_delta, 600);
}

#[test]
fn test_watermarks_and_cpu_frequency() {
    let system = FakeSystem::new();
    system.set_watermarks("1\n", "0\n");
    system.set_time_in_state("250000 100\n500000 100\n");
    let source = HookedSource::new(system.source(), |round| {
        if round == 1 {
            system.set_time_in_state("250000 200\n500000 400\n");
            system.set_watermarks("1\n", "1\n");
        }
    });

    let mut monitor = Monitor::new(source, settings(2), &[], CancellationToken::new()).unwrap();
    let mut sink = collect();
    monitor.run(&mut sink).unwrap();

    assert_eq!(sink.rounds[0].cpu_freq_mhz, 0);
    assert_eq!(
        sink.rounds[0].watermarks,
        Some(WatermarkFlags {
            low: true,
            high: false
        })
    );
    assert_eq!(sink.rounds[1].cpu_freq_mhz, 437);
    assert_eq!(sink.rounds[1].watermarks.map(|w| w.label()), Some("BL"));
}

#[test]
fn test_cpu_frequency_averages_since_last_reported_round() {
    let system = FakeSystem::new();
    system.add_process(9, b"/bin/x\0", 100, 100, 0);
    system.set_time_in_state("250000 100\n500000 100\n");
    let source = HookedSource::new(system.source(), |round| match round {
        // Unreported round: only time at 250 MHz
        1 => system.set_time_in_state("250000 200\n500000 100\n"),
        2 => {
            system.set_time_in_state("250000 200\n500000 400\n");
            system.set_memory(9, 100, 140);
        }
        _ => {}
    });

    let mut s = settings(1);
    s.filter.mem_changes_only = true;
    let mut monitor = Monitor::new(source, s, &[9], CancellationToken::new()).unwrap();
    let mut sink = collect();
    monitor.run(&mut sink).unwrap();

    assert_eq!(sink.rounds.len(), 1);
    // 100 ticks at 250 MHz and 300 at 500 MHz since the baseline
    assert_eq!(sink.rounds[0].cpu_freq_mhz, 437);
}

#[test]
fn test_table_report() {
    let system = FakeSystem::new();
    system.add_process(4242, b"/usr/bin/ssh\0root@host\0", 1252, 2784, 0);

    let mut monitor =
        Monitor::new(system.source(), settings(2), &[4242], CancellationToken::new()).unwrap();
    let mut reporter = TableReporter::new(Vec::new(), false, 0);
    monitor.run(&mut reporter).unwrap();

    let out = String::from_utf8(reporter.into_inner()).unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 7, "{out}");
    assert_eq!(lines[0], "System total memory: 262144 kB RAM, 768000 kB swap");
    assert_eq!(lines[1], "PID  4242: ssh root@host");
    assert!(lines[3].contains("/PID 4242  ssh root@host"));
    assert!(lines[5].ends_with("   59144       +0   0.00     0    1252    2784      +0   0.00"));
}

#[test]
fn test_missing_meminfo_is_fatal() {
    let dir = tempdir().expect("Failed to create temp dir");
    let source = ProcFs::new(dir.path(), dir.path(), 4);
    let result = Monitor::new(source, settings(1), &[1], CancellationToken::new());
    assert!(matches!(result, Err(MonitorError::SourceUnavailable { .. })));
}

#[test]
fn test_zero_pid_is_rejected() {
    let system = FakeSystem::new();
    let result = Monitor::new(system.source(), settings(1), &[0], CancellationToken::new());
    assert!(matches!(result, Err(MonitorError::Registry(_))));
}
