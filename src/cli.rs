//! CLI arguments and subcommands for herakles-mem-cpu-monitor.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-mem-cpu-monitor",
    about = "Periodic system and per-process memory/CPU monitor",
    long_about = "Periodic system and per-process memory/CPU monitor.\n\n\
                  Prints used RAM, system CPU usage and average CPU frequency every INTERVAL \
                  seconds, together with private clean/dirty memory and CPU usage of the \
                  given processes.",
    author = "Michael Moll <exporter@herakles.now> - Herakles",
    version = "0.1.0",
    propagate_version = true,
    after_help = "Examples:\n  herakles-mem-cpu-monitor 5 1547 2210\n  herakles-mem-cpu-monitor -i 1 -m --self -f monitor.log"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Seconds between rounds (superseded by --interval)
    #[arg(value_name = "INTERVAL")]
    pub interval_positional: Option<u64>,

    /// Process IDs to monitor
    #[arg(value_name = "PID")]
    pub pids: Vec<u32>,

    /// Seconds between rounds
    #[arg(short = 'i', long)]
    pub interval: Option<u64>,

    /// Additional process ID to monitor (repeatable)
    #[arg(short = 'p', long = "pid", value_name = "PID")]
    pub extra_pids: Vec<u32>,

    /// Monitor this monitor's own process as well
    #[arg(long = "self")]
    pub monitor_self: bool,

    /// Append the report to FILE instead of printing it
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    pub output_file: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    pub no_colors: bool,

    /// Report only rounds where a monitored process' memory changed
    #[arg(short = 'm', long = "mem-changes")]
    pub mem_changes_only: bool,

    /// Report only rounds where a monitored process used CPU
    #[arg(short = 'c', long = "cpu-changes")]
    pub cpu_changes_only: bool,

    /// Report when used RAM moved at least KB since the last report
    #[arg(short = 'M', long = "system-mem-change", value_name = "KB")]
    pub system_mem_change_kb: Option<u64>,

    /// Report when system CPU usage moved at least PERCENT since the last report
    #[arg(short = 'C', long = "system-cpu-change", value_name = "PERCENT")]
    pub system_cpu_change_percent: Option<f32>,

    /// Stop after N reported rounds
    #[arg(short = 'n', long = "count", value_name = "N")]
    pub max_rounds: Option<u64>,

    /// Log level [default: warn]
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that the required /proc and /sys sources are readable
    Check,
}
