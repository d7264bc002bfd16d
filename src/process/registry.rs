//! The set of processes under observation.
//!
//! Entries are kept in registration order, which is also the report order.
//! Each round fully replaces an entry's memory and tick figures from its
//! sources; the deltas are the difference to the replaced values.

use tracing::debug;

use crate::delta::{cpu_tick_delta, memory_delta};
use crate::error::RegistryError;
use crate::process::memory::PrivateMemory;
use crate::process::name::UNKNOWN_PROCESS_NAME;
use crate::shutdown::CancellationToken;
use crate::source::{MetricSource, ProcessPaths};

/// Initial capacity of the registry once the first process is added.
const MIN_CAPACITY: usize = 4;

/// One monitored process and its latest snapshot.
#[derive(Debug, Clone)]
pub struct MonitoredProcess {
    pid: u32,
    name: Option<String>,
    paths: ProcessPaths,
    memory: PrivateMemory,
    cputicks_total: u64,
    mem_change: i64,
    cputicks_change: u64,
}

impl MonitoredProcess {
    fn new(pid: u32, name: Option<String>, paths: ProcessPaths) -> Self {
        Self {
            pid,
            name,
            paths,
            memory: PrivateMemory::default(),
            cputicks_total: 0,
            mem_change: 0,
            cputicks_change: 0,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name for display, `<unknown>` when none was resolved.
    pub fn display_name(&self) -> &str {
        self.name().unwrap_or(UNKNOWN_PROCESS_NAME)
    }

    pub fn paths(&self) -> &ProcessPaths {
        &self.paths
    }

    pub fn memory(&self) -> PrivateMemory {
        self.memory
    }

    /// Change of clean + dirty memory during the last round, in kilobytes.
    pub fn mem_change(&self) -> i64 {
        self.mem_change
    }

    pub fn cputicks_total(&self) -> u64 {
        self.cputicks_total
    }

    /// User + system ticks used during the last round.
    pub fn cputicks_change(&self) -> u64 {
        self.cputicks_change
    }

    /// Re-reads memory and CPU ticks, replacing the previous snapshot.
    pub fn sample<S: MetricSource + ?Sized>(&mut self, source: &mut S) {
        let memory = source.read_process_memory(&self.paths.smaps);
        self.mem_change = memory_delta(
            kb_as_i64(self.memory.total_kb()),
            kb_as_i64(memory.total_kb()),
        );
        self.memory = memory;

        let ticks = source.read_process_cpu_ticks(&self.paths.stat);
        self.cputicks_change = cpu_tick_delta(self.cputicks_total, ticks);
        self.cputicks_total = ticks;
    }

    pub fn reset_deltas(&mut self) {
        self.mem_change = 0;
        self.cputicks_change = 0;
    }
}

/// Monitored processes in registration order.
fn kb_as_i64(kb: u64) -> i64 {
    i64::try_from(kb).unwrap_or(i64::MAX)
}

#[derive(Debug, Default)]
pub struct ProcessRegistry {
    entries: Vec<MonitoredProcess>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `pid` to the monitored set.
    ///
    /// Source paths are derived from the PID and the display name is resolved
    /// once, here. The snapshot starts at zero. Storage doubles when full.
    pub fn register<S: MetricSource + ?Sized>(
        &mut self,
        pid: u32,
        source: &mut S,
    ) -> Result<&MonitoredProcess, RegistryError> {
        if pid == 0 {
            return Err(RegistryError::InvalidPid);
        }

        if self.entries.len() == self.entries.capacity() {
            let requested = (self.entries.capacity() * 2).max(MIN_CAPACITY);
            self.entries
                .try_reserve_exact(requested - self.entries.len())
                .map_err(|_| RegistryError::Allocation { requested })?;
        }

        let paths = source.process_paths(pid);
        let name = source.read_process_name(&paths);
        debug!(
            "Registered PID {} ({})",
            pid,
            name.as_deref().unwrap_or(UNKNOWN_PROCESS_NAME)
        );

        self.entries.push(MonitoredProcess::new(pid, name, paths));
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Samples every entry in registration order.
    ///
    /// Stops before the next entry once shutdown was requested; entries
    /// already sampled keep their new values. Returns how many were sampled.
    pub fn update_all<S: MetricSource + ?Sized>(
        &mut self,
        source: &mut S,
        cancel: &CancellationToken,
    ) -> usize {
        let mut updated = 0;
        for entry in &mut self.entries {
            if cancel.is_cancelled() {
                break;
            }
            entry.sample(source);
            updated += 1;
        }
        updated
    }

    pub fn reset_deltas(&mut self) {
        self.entries.iter_mut().for_each(MonitoredProcess::reset_deltas);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MonitoredProcess> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[MonitoredProcess] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Drops every entry together with its storage.
    pub fn clear(&mut self) {
        self.entries = Vec::new();
    }
}

impl<'a> IntoIterator for &'a ProcessRegistry {
    type Item = &'a MonitoredProcess;
    type IntoIter = std::slice::Iter<'a, MonitoredProcess>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
