//! Per-process metrics and the registry of monitored processes.
//!
//! This module provides:
//! - `memory`: private clean/dirty memory from /proc/<pid>/smaps
//! - `cpu`: user + system ticks from /proc/<pid>/stat
//! - `name`: display name from /proc/<pid>/cmdline or /proc/<pid>/status
//! - `registry`: the monitored set and its per-round snapshots

pub mod cpu;
pub mod memory;
pub mod name;
pub mod registry;

// Re-export commonly used types
pub use memory::PrivateMemory;
pub use name::UNKNOWN_PROCESS_NAME;
pub use registry::{MonitoredProcess, ProcessRegistry};
