//! Per-round report data and the tabular writer.
//!
//! The sampling loop hands every finished round to a [`RoundSink`]. The
//! shipped sink is [`TableReporter`], which prints the classic fixed-width
//! table:
//!
//! ```text
//! System total memory: 262144 kB RAM, 768000 kB swap
//! PID  1547: browser
//!                _______________  ____________  _____________________________
//! ________  __  / system memory \/ system CPU \/PID 1547  browser            \
//! time:   \/BL\/  used:  change:     %:  MHz:   clean:  dirty: change: CPU-%:
//! 02:22:31  --   143272       +0   0.00     0    1252    2784      +0   0.00
//! 02:22:34  --   143272       +0   1.32   253    1252    2784      +0   0.00
//! ```

use std::io::{self, Write};

use chrono::{DateTime, Local};

use crate::process::MonitoredProcess;
use crate::system::MemoryTotals;
use crate::watermark::WatermarkFlags;

const COLOR_CLEAR: &str = "\x1b[0m";
const COLOR_LOWMARK: &str = "\x1b[33m";
const COLOR_HIGHMARK: &str = "\x1b[31m";
const COLOR_PROCESS: &str = "\x1b[32m";

/// Width of the process name in the column header.
const HEADER_NAME_WIDTH: usize = 19;

/// Lines printed by one header block.
const HEADER_LINES: usize = 3;

/// Figures for one monitored process in one round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessReport {
    pub pid: u32,
    pub clean_kb: u64,
    pub dirty_kb: u64,
    pub mem_delta: i64,
    pub cpu_tick_delta: u64,
    pub cpu_percent: f32,
}

/// Everything reported for one round.
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub timestamp: DateTime<Local>,
    /// `None` when the watermark files do not exist on this system.
    pub watermarks: Option<WatermarkFlags>,
    pub system_used_kb: i64,
    pub system_used_delta: i64,
    pub system_cpu_percent: f32,
    pub cpu_freq_mhz: u32,
    /// One entry per registered process, in registration order.
    pub processes: Vec<ProcessReport>,
}

impl Default for RoundReport {
    fn default() -> Self {
        Self {
            timestamp: Local::now(),
            watermarks: None,
            system_used_kb: 0,
            system_used_delta: 0,
            system_cpu_percent: 0.0,
            cpu_freq_mhz: 0,
            processes: Vec::new(),
        }
    }
}

/// Static facts printed once before the first round.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary<'a> {
    pub totals: MemoryTotals,
    pub processes: &'a [MonitoredProcess],
    pub watermarks_available: bool,
}

/// Receives finished rounds from the sampling loop.
pub trait RoundSink {
    fn start(&mut self, summary: &RunSummary<'_>) -> io::Result<()>;

    /// Called once per emitted round; the round is always complete.
    fn emit(&mut self, round: &RoundReport) -> io::Result<()>;
}

/// Change-only reporting options.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChangeFilter {
    /// Report only rounds where some process' memory changed.
    pub mem_changes_only: bool,
    /// Report only rounds where some process used CPU.
    pub cpu_changes_only: bool,
    /// Report when used RAM moved at least this much since the last report.
    pub system_mem_change_kb: Option<u64>,
    /// Report when system CPU % moved at least this much since the last report.
    pub system_cpu_change_percent: Option<f32>,
}

/// Decides which rounds reach the sink.
#[derive(Debug, Clone)]
pub struct ReportFilter {
    options: ChangeFilter,
    emit_by_default: bool,
    last_used_kb: i64,
    last_cpu_percent: f32,
}

impl ReportFilter {
    pub fn new(options: ChangeFilter, monitoring_processes: bool) -> Self {
        let system_threshold = options.system_mem_change_kb.is_some()
            || options.system_cpu_change_percent.is_some();
        let process_filter =
            monitoring_processes && (options.mem_changes_only || options.cpu_changes_only);
        Self {
            options,
            emit_by_default: !(system_threshold || process_filter),
            last_used_kb: 0,
            last_cpu_percent: 0.0,
        }
    }

    /// Sets the reference values thresholds are measured against.
    pub fn prime(&mut self, used_kb: i64, cpu_percent: f32) {
        self.last_used_kb = used_kb;
        self.last_cpu_percent = cpu_percent;
    }

    /// Returns whether `round` is reported; a reported round becomes the new
    /// reference for the system thresholds.
    pub fn should_emit(&mut self, round: &RoundReport) -> bool {
        let emit = self.emit_by_default || self.system_changed(round) || self.process_changed(round);
        if emit {
            self.prime(round.system_used_kb, round.system_cpu_percent);
        }
        emit
    }

    fn system_changed(&self, round: &RoundReport) -> bool {
        let mem = self.options.system_mem_change_kb.is_some_and(|threshold| {
            (round.system_used_kb - self.last_used_kb).unsigned_abs() >= threshold
        });
        let cpu = self.options.system_cpu_change_percent.is_some_and(|threshold| {
            (round.system_cpu_percent - self.last_cpu_percent).abs() >= threshold
        });
        mem || cpu
    }

    fn process_changed(&self, round: &RoundReport) -> bool {
        round.processes.iter().any(|p| {
            (self.options.mem_changes_only && p.mem_delta != 0)
                || (self.options.cpu_changes_only && p.cpu_tick_delta != 0)
        })
    }
}

/// Shortens `s` to `max` characters, ending in `...` when cut.
pub fn truncate_name(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// Fixed-width table writer for consoles and log files.
pub struct TableReporter<W: Write> {
    out: W,
    colors: bool,
    rows: usize,
    lines_printed: usize,
    watermarks_available: bool,
    columns: Vec<(u32, String)>,
}

impl<W: Write> TableReporter<W> {
    /// `rows` is the terminal height; 0 disables header reprinting.
    pub fn new(out: W, colors: bool, rows: usize) -> Self {
        Self {
            out,
            colors,
            rows,
            lines_printed: 0,
            watermarks_available: false,
            columns: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn c_begin(&self, i: usize) -> &'static str {
        if self.colors && i % 2 == 0 {
            COLOR_PROCESS
        } else {
            ""
        }
    }

    fn c_end(&self, i: usize) -> &'static str {
        if self.colors && i % 2 == 0 {
            COLOR_CLEAR
        } else {
            ""
        }
    }

    fn write_flags(&mut self, flags: Option<WatermarkFlags>) -> io::Result<()> {
        let Some(flags) = flags else {
            return Ok(());
        };
        let color = match (flags.low, flags.high) {
            (_, true) => COLOR_HIGHMARK,
            (true, false) => COLOR_LOWMARK,
            (false, false) => "",
        };
        if self.colors && !color.is_empty() {
            write!(self.out, "{color} {}{COLOR_CLEAR}", flags.label())
        } else {
            write!(self.out, " {}", flags.label())
        }
    }

    fn write_headers(&mut self) -> io::Result<()> {
        let wm = self.watermarks_available;

        write!(
            self.out,
            "{}            _______________  ____________ ",
            if wm { "   " } else { "" }
        )?;
        for i in 0..self.columns.len() {
            write!(self.out, "{} _____________________________ {}", self.c_begin(i), self.c_end(i))?;
        }
        writeln!(self.out)?;

        write!(
            self.out,
            "________{} / system memory \\/ system CPU \\",
            if wm { "  __ " } else { "_ " }
        )?;
        for i in 0..self.columns.len() {
            let (begin, end) = (self.c_begin(i), self.c_end(i));
            let (pid, name) = &self.columns[i];
            write!(
                self.out,
                "{begin}/PID {pid:<5} {name:<width$}\\{end}",
                width = HEADER_NAME_WIDTH
            )?;
        }
        writeln!(self.out)?;

        write!(
            self.out,
            "time: {}\\/  used:  change:     %:  MHz: ",
            if wm { "  \\/BL" } else { "   " }
        )?;
        for i in 0..self.columns.len() {
            write!(self.out, "{}  clean:  dirty: change: CPU-%:{}", self.c_begin(i), self.c_end(i))?;
        }
        writeln!(self.out)?;

        self.lines_printed = HEADER_LINES;
        Ok(())
    }
}

impl<W: Write> RoundSink for TableReporter<W> {
    fn start(&mut self, summary: &RunSummary<'_>) -> io::Result<()> {
        self.watermarks_available = summary.watermarks_available;
        self.columns = summary
            .processes
            .iter()
            .map(|p| (p.pid(), truncate_name(p.display_name(), HEADER_NAME_WIDTH)))
            .collect();

        writeln!(
            self.out,
            "System total memory: {} kB RAM, {} kB swap",
            summary.totals.ram_total_kb, summary.totals.swap_total_kb
        )?;
        for (i, p) in summary.processes.iter().enumerate() {
            writeln!(
                self.out,
                "{}PID {:5}: {}{}",
                self.c_begin(i),
                p.pid(),
                p.display_name(),
                self.c_end(i)
            )?;
        }
        self.write_headers()?;
        self.out.flush()
    }

    fn emit(&mut self, round: &RoundReport) -> io::Result<()> {
        write!(self.out, "{} ", round.timestamp.format("%H:%M:%S"))?;
        self.write_flags(round.watermarks)?;
        write!(
            self.out,
            "{:9} {:+8} {:6.2}{:6}",
            round.system_used_kb, round.system_used_delta, round.system_cpu_percent, round.cpu_freq_mhz
        )?;
        for (i, p) in round.processes.iter().enumerate() {
            write!(
                self.out,
                "{} {:7} {:7} {:+7} {:6.2}{}",
                self.c_begin(i),
                p.clean_kb,
                p.dirty_kb,
                p.mem_delta,
                p.cpu_percent,
                self.c_end(i)
            )?;
        }
        writeln!(self.out)?;
        self.out.flush()?;

        if self.rows > 0 {
            self.lines_printed += 1;
            if self.lines_printed >= self.rows - 1 {
                self.write_headers()?;
                self.out.flush()?;
            }
        }
        Ok(())
    }
}
