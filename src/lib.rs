//! Herakles Memory/CPU Monitor Library
//!
//! This library provides the sampling engine behind `herakles-mem-cpu-monitor`:
//! it periodically reads system-wide and per-process memory and CPU counters
//! from /proc and /sys and turns consecutive samples into per-round deltas.
//!
//! # Features
//!
//! - **Robust readers**: vanished processes and malformed lines read as zero
//! - **Allocation-free rounds**: one scratch buffer and one reusable report
//! - **Cooperative shutdown**: a cancellation token polled between steps
//! - **Pluggable output**: rounds go to any [`report::RoundSink`]
//!
//! # Usage
//!
//! ```no_run
//! use herakles_mem_cpu_monitor::monitor::{Monitor, MonitorSettings};
//! use herakles_mem_cpu_monitor::report::TableReporter;
//! use herakles_mem_cpu_monitor::shutdown::CancellationToken;
//! use herakles_mem_cpu_monitor::source::ProcFs;
//!
//! let settings = MonitorSettings {
//!     max_rounds: Some(5),
//!     ..MonitorSettings::default()
//! };
//! let mut monitor = Monitor::new(ProcFs::default(), settings, &[1], CancellationToken::new())?;
//! let mut reporter = TableReporter::new(std::io::stdout(), false, 0);
//! monitor.run(&mut reporter)?;
//! # Ok::<(), herakles_mem_cpu_monitor::error::MonitorError>(())
//! ```

pub mod cpufreq;
pub mod delta;
pub mod error;
pub mod monitor;
pub mod process;
pub mod report;
pub mod shutdown;
pub mod source;
pub mod system;
pub mod watermark;

// Re-export main types for convenience
pub use error::{MonitorError, RegistryError};
pub use monitor::{Monitor, MonitorSettings, Phase, RunOutcome};
pub use report::{RoundReport, RoundSink, TableReporter};
pub use shutdown::CancellationToken;
pub use source::{MetricSource, ProcFs};
