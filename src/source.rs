//! Metric sources.
//!
//! [`MetricSource`] is the seam between the sampling loop and the kernel's
//! textual interfaces. [`ProcFs`] implements it on top of /proc and /sys and
//! owns the single scratch buffer every read goes through, so a steady-state
//! round does not allocate.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cpufreq::{FreqSnapshot, TIME_IN_STATE};
use crate::error::MonitorError;
use crate::process::memory::{parse_smaps, PrivateMemory};
use crate::process::{cpu::parse_stat_ticks, name::read_process_name};
use crate::system::{parse_cpu_ticks, parse_memory_totals, parse_ram_used, CpuTicks, MemoryTotals};
use crate::watermark::{parse_flag, WatermarkFlags, HIGH_WATERMARK, LOW_WATERMARK};

pub const DEFAULT_PROC_ROOT: &str = "/proc";
pub const DEFAULT_SYS_ROOT: &str = "/sys";
pub const DEFAULT_SCRATCH_KB: usize = 64;

/// Per-process source locations, derived once from the PID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessPaths {
    pub proc_dir: PathBuf,
    pub smaps: PathBuf,
    pub stat: PathBuf,
}

/// Everything the sampling loop reads, one method per metric.
///
/// Per-process and CPU reads never fail: a vanished or malformed source reads
/// as zero. Only the meminfo reads report errors.
pub trait MetricSource {
    /// RAM and swap totals. Read once at startup.
    fn read_system_totals(&mut self) -> Result<MemoryTotals, MonitorError>;

    /// Used RAM (`total - free - buffers - cached`) in kilobytes.
    fn read_system_used(&mut self, ram_total_kb: u64) -> Result<i64, MonitorError>;

    /// Aggregate CPU ticks, zero when unavailable.
    fn read_system_cpu_ticks(&mut self) -> CpuTicks;

    fn process_paths(&self, pid: u32) -> ProcessPaths;

    /// Best-effort display name, resolved once at registration.
    fn read_process_name(&mut self, paths: &ProcessPaths) -> Option<String>;

    /// Private clean/dirty memory, zero when the process is gone.
    fn read_process_memory(&mut self, smaps: &Path) -> PrivateMemory;

    /// `utime + stime`, zero when the process is gone or the line is malformed.
    fn read_process_cpu_ticks(&mut self, stat: &Path) -> u64;

    /// Whether both watermark flag files can be read.
    fn watermarks_available(&mut self) -> bool {
        false
    }

    fn read_watermarks(&mut self) -> WatermarkFlags {
        WatermarkFlags::default()
    }

    /// Refills `snapshot` from cpufreq stats; leaves it empty when unavailable.
    fn read_cpu_freq(&mut self, snapshot: &mut FreqSnapshot) {
        snapshot.clear();
    }

    /// Drops buffers held for reading. No reads follow.
    fn release(&mut self) {}
}

/// [`MetricSource`] backed by the proc and sysfs pseudo-filesystems.
pub struct ProcFs {
    proc_root: PathBuf,
    meminfo: PathBuf,
    stat: PathBuf,
    low_watermark: PathBuf,
    high_watermark: PathBuf,
    time_in_state: PathBuf,
    scratch: Vec<u8>,
    peak_bytes: usize,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new(DEFAULT_PROC_ROOT, DEFAULT_SYS_ROOT, DEFAULT_SCRATCH_KB)
    }
}

impl ProcFs {
    pub fn new(proc_root: impl Into<PathBuf>, sys_root: impl Into<PathBuf>, scratch_kb: usize) -> Self {
        let proc_root = proc_root.into();
        let sys_root = sys_root.into();
        Self {
            meminfo: proc_root.join("meminfo"),
            stat: proc_root.join("stat"),
            low_watermark: sys_root.join(LOW_WATERMARK),
            high_watermark: sys_root.join(HIGH_WATERMARK),
            time_in_state: sys_root.join(TIME_IN_STATE),
            proc_root,
            scratch: Vec::with_capacity(scratch_kb * 1024),
            peak_bytes: 0,
        }
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    /// Largest file read through the scratch buffer so far.
    pub fn scratch_peak_bytes(&self) -> usize {
        self.peak_bytes
    }

    fn read_meminfo(&mut self) -> Result<&str, MonitorError> {
        load_str(&mut self.scratch, &mut self.peak_bytes, &self.meminfo)
            .map_err(|e| MonitorError::unavailable(self.meminfo.display().to_string(), e.to_string()))
    }
}

/// Reads `path` into `scratch`, reusing its capacity.
fn load<'a>(scratch: &'a mut Vec<u8>, peak_bytes: &mut usize, path: &Path) -> io::Result<&'a [u8]> {
    scratch.clear();
    File::open(path)?.read_to_end(scratch)?;
    *peak_bytes = (*peak_bytes).max(scratch.len());
    Ok(scratch)
}

fn load_str<'a>(scratch: &'a mut Vec<u8>, peak_bytes: &mut usize, path: &Path) -> io::Result<&'a str> {
    let bytes = load(scratch, peak_bytes, path)?;
    std::str::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

impl MetricSource for ProcFs {
    fn read_system_totals(&mut self) -> Result<MemoryTotals, MonitorError> {
        parse_memory_totals(self.read_meminfo()?)
    }

    fn read_system_used(&mut self, ram_total_kb: u64) -> Result<i64, MonitorError> {
        parse_ram_used(self.read_meminfo()?, ram_total_kb)
    }

    fn read_system_cpu_ticks(&mut self) -> CpuTicks {
        match load_str(&mut self.scratch, &mut self.peak_bytes, &self.stat) {
            Ok(content) => parse_cpu_ticks(content),
            Err(e) => {
                debug!("Failed to read {}: {}", self.stat.display(), e);
                CpuTicks::default()
            }
        }
    }

    fn process_paths(&self, pid: u32) -> ProcessPaths {
        let proc_dir = self.proc_root.join(pid.to_string());
        ProcessPaths {
            smaps: proc_dir.join("smaps"),
            stat: proc_dir.join("stat"),
            proc_dir,
        }
    }

    fn read_process_name(&mut self, paths: &ProcessPaths) -> Option<String> {
        read_process_name(&paths.proc_dir)
    }

    fn read_process_memory(&mut self, smaps: &Path) -> PrivateMemory {
        match load(&mut self.scratch, &mut self.peak_bytes, smaps) {
            Ok(content) => parse_smaps(content),
            Err(e) => {
                debug!("Failed to read {}: {}", smaps.display(), e);
                PrivateMemory::default()
            }
        }
    }

    fn read_process_cpu_ticks(&mut self, stat: &Path) -> u64 {
        match load(&mut self.scratch, &mut self.peak_bytes, stat) {
            Ok(content) => parse_stat_ticks(content),
            Err(e) => {
                debug!("Failed to read {}: {}", stat.display(), e);
                0
            }
        }
    }

    fn watermarks_available(&mut self) -> bool {
        File::open(&self.low_watermark).is_ok() && File::open(&self.high_watermark).is_ok()
    }

    fn read_watermarks(&mut self) -> WatermarkFlags {
        let low = load(&mut self.scratch, &mut self.peak_bytes, &self.low_watermark)
            .map(parse_flag)
            .unwrap_or(false);
        let high = load(&mut self.scratch, &mut self.peak_bytes, &self.high_watermark)
            .map(parse_flag)
            .unwrap_or(false);
        WatermarkFlags { low, high }
    }

    fn read_cpu_freq(&mut self, snapshot: &mut FreqSnapshot) {
        match load_str(&mut self.scratch, &mut self.peak_bytes, &self.time_in_state) {
            Ok(content) => snapshot.parse(content),
            Err(_) => snapshot.clear(),
        }
    }

    fn release(&mut self) {
        debug!("Scratch buffer peak usage: {} bytes", self.peak_bytes);
        self.scratch = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_process_paths() {
        let fs = ProcFs::new("/proc", "/sys", 4);
        let paths = fs.process_paths(1547);
        assert_eq!(paths.proc_dir, PathBuf::from("/proc/1547"));
        assert_eq!(paths.smaps, PathBuf::from("/proc/1547/smaps"));
        assert_eq!(paths.stat, PathBuf::from("/proc/1547/stat"));
    }

    #[test]
    fn test_missing_meminfo_is_unavailable() {
        let dir = tempdir().expect("Failed to create temp dir");
        let mut fs = ProcFs::new(dir.path(), dir.path(), 4);
        assert!(matches!(
            fs.read_system_totals(),
            Err(MonitorError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_missing_process_reads_zero() {
        let dir = tempdir().expect("Failed to create temp dir");
        let mut fs = ProcFs::new(dir.path(), dir.path(), 4);
        let paths = fs.process_paths(4242);
        assert_eq!(fs.read_process_memory(&paths.smaps), PrivateMemory::default());
        assert_eq!(fs.read_process_cpu_ticks(&paths.stat), 0);
        assert_eq!(fs.read_system_cpu_ticks(), CpuTicks::default());
    }

    #[test]
    fn test_watermarks() {
        let dir = tempdir().expect("Failed to create temp dir");
        let mut fs = ProcFs::new(dir.path(), dir.path(), 4);
        assert!(!fs.watermarks_available());

        std::fs::create_dir_all(dir.path().join("kernel")).unwrap();
        std::fs::write(dir.path().join(LOW_WATERMARK), "1\n").unwrap();
        assert!(!fs.watermarks_available());

        std::fs::write(dir.path().join(HIGH_WATERMARK), "0\n").unwrap();
        assert!(fs.watermarks_available());
        assert_eq!(
            fs.read_watermarks(),
            WatermarkFlags {
                low: true,
                high: false
            }
        );
    }

    #[test]
    fn test_scratch_peak_tracks_largest_read() {
        let dir = tempdir().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("stat"), "cpu  1 2 3 4\n").unwrap();
        std::fs::write(dir.path().join("meminfo"), "MemTotal: 8 kB\nSwapTotal: 0 kB\n").unwrap();

        let mut fs = ProcFs::new(dir.path(), dir.path(), 1);
        fs.read_system_cpu_ticks();
        fs.read_system_totals().unwrap();
        assert_eq!(fs.scratch_peak_bytes(), "MemTotal: 8 kB\nSwapTotal: 0 kB\n".len());
    }
}
