//! Configuration management for herakles-mem-cpu-monitor.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat};
use herakles_mem_cpu_monitor::monitor::MonitorSettings;
use herakles_mem_cpu_monitor::report::ChangeFilter;
use herakles_mem_cpu_monitor::source::{DEFAULT_PROC_ROOT, DEFAULT_SCRATCH_KB, DEFAULT_SYS_ROOT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// Default configuration constants
pub const DEFAULT_INTERVAL_SECONDS: u64 = 3;

/// Configuration structure; every field is optional so files may be partial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Sampling
    #[serde(alias = "interval")]
    pub interval_seconds: Option<u64>,
    pub pids: Option<Vec<u32>>,
    #[serde(alias = "self")]
    pub monitor_self: Option<bool>,
    #[serde(alias = "count")]
    pub max_rounds: Option<u64>,

    // Output
    #[serde(alias = "file")]
    pub output_file: Option<PathBuf>,
    pub colors: Option<bool>,

    // Change-only reporting
    #[serde(alias = "mem-changes")]
    pub mem_changes_only: Option<bool>,
    #[serde(alias = "cpu-changes")]
    pub cpu_changes_only: Option<bool>,
    #[serde(alias = "system-mem-change")]
    pub system_mem_change_kb: Option<u64>,
    #[serde(alias = "system-cpu-change")]
    pub system_cpu_change_percent: Option<f32>,

    // Sources
    pub proc_root: Option<PathBuf>,
    pub sys_root: Option<PathBuf>,
    pub scratch_buffer_kb: Option<usize>,

    // Logging
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_seconds: Some(DEFAULT_INTERVAL_SECONDS),
            pids: None,
            monitor_self: Some(false),
            max_rounds: None,
            output_file: None,
            colors: Some(true),
            mem_changes_only: Some(false),
            cpu_changes_only: Some(false),
            system_mem_change_kb: None,
            system_cpu_change_percent: None,
            proc_root: Some(PathBuf::from(DEFAULT_PROC_ROOT)),
            sys_root: Some(PathBuf::from(DEFAULT_SYS_ROOT)),
            scratch_buffer_kb: Some(DEFAULT_SCRATCH_KB),
            log_level: Some("warn".into()),
        }
    }
}

impl Config {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.unwrap_or(DEFAULT_INTERVAL_SECONDS))
    }

    pub fn proc_root(&self) -> PathBuf {
        self.proc_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_ROOT))
    }

    pub fn sys_root(&self) -> PathBuf {
        self.sys_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SYS_ROOT))
    }

    pub fn scratch_buffer_kb(&self) -> usize {
        self.scratch_buffer_kb.unwrap_or(DEFAULT_SCRATCH_KB)
    }

    pub fn colors(&self) -> bool {
        self.colors.unwrap_or(true)
    }

    /// PIDs to monitor in report order; `self_pid` is appended for --self.
    pub fn effective_pids(&self, self_pid: u32) -> Vec<u32> {
        let mut pids = self.pids.clone().unwrap_or_default();
        if self.monitor_self.unwrap_or(false) {
            pids.push(self_pid);
        }
        pids
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            interval: self.interval(),
            filter: ChangeFilter {
                mem_changes_only: self.mem_changes_only.unwrap_or(false),
                cpu_changes_only: self.cpu_changes_only.unwrap_or(false),
                system_mem_change_kb: self.system_mem_change_kb,
                system_cpu_change_percent: self.system_cpu_change_percent,
            },
            max_rounds: self.max_rounds,
        }
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if cfg.interval_seconds == Some(0) {
        return Err("interval_seconds must be at least 1".into());
    }

    if let Some(percent) = cfg.system_cpu_change_percent {
        if percent.is_nan() || percent < 0.0 {
            return Err(format!(
                "Invalid system_cpu_change_percent {}, expected a non-negative number",
                percent
            )
            .into());
        }
    }

    if cfg.scratch_buffer_kb == Some(0) {
        return Err("scratch_buffer_kb must be at least 1".into());
    }

    if cfg.pids.as_ref().is_some_and(|pids| pids.contains(&0)) {
        return Err("PID 0 cannot be monitored".into());
    }

    if cfg.max_rounds == Some(0) {
        return Err("max_rounds must be at least 1 when set".into());
    }

    if let Some(level) = cfg.log_level.as_deref() {
        match level {
            "off" | "error" | "warn" | "info" | "debug" | "trace" => {}
            other => {
                return Err(format!(
                    "Invalid log_level '{}', expected off/error/warn/info/debug/trace",
                    other
                )
                .into());
            }
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    // Interval: -i wins over the positional argument
    if let Some(interval) = args.interval.or(args.interval_positional) {
        config.interval_seconds = Some(interval);
    }

    // PIDs given on the command line replace the configured list
    if !args.pids.is_empty() || !args.extra_pids.is_empty() {
        config.pids = Some(
            args.pids
                .iter()
                .chain(args.extra_pids.iter())
                .copied()
                .collect(),
        );
    }

    if args.monitor_self {
        config.monitor_self = Some(true);
    }
    if let Some(file) = &args.output_file {
        config.output_file = Some(file.clone());
    }
    if args.no_colors {
        config.colors = Some(false);
    }

    // Change-only reporting
    if args.mem_changes_only {
        config.mem_changes_only = Some(true);
    }
    if args.cpu_changes_only {
        config.cpu_changes_only = Some(true);
    }
    if let Some(kb) = args.system_mem_change_kb {
        config.system_mem_change_kb = Some(kb);
    }
    if let Some(percent) = args.system_cpu_change_percent {
        config.system_cpu_change_percent = Some(percent);
    }
    if let Some(n) = args.max_rounds {
        config.max_rounds = Some(n);
    }
    if let Some(level) = &args.log_level {
        config.log_level = Some(level.as_str().to_string());
    }

    Ok(config)
}

/// Configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            // Try default locations
            let defaults = [
                "/etc/herakles/mem-cpu-monitor.yaml",
                "/etc/herakles/mem-cpu-monitor.yml",
                "/etc/herakles/mem-cpu-monitor.json",
                "./herakles-mem-cpu-monitor.yaml",
                "./herakles-mem-cpu-monitor.yml",
                "./herakles-mem-cpu-monitor.json",
            ];

            match defaults.iter().find(|p| Path::new(p).exists()) {
                Some(found) => PathBuf::from(found),
                None => return Ok(Config::default()),
            }
        }
    };

    let content = fs::read_to_string(&path)
        .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };

    println!("{output}");
    Ok(())
}
