//! herakles-mem-cpu-monitor - version 0.1.0
//!
//! Periodic memory and CPU monitor with tracing logging.
//! This is the main entry point that wires configuration, signals and the
//! sampling loop together and handles subcommands.

mod cli;
mod config;
mod startup_checks;

use clap::Parser;
use herakles_mem_cpu_monitor::monitor::{Monitor, RunOutcome};
use herakles_mem_cpu_monitor::report::TableReporter;
use herakles_mem_cpu_monitor::shutdown::{CancellationToken, ShutdownRequest};
use herakles_mem_cpu_monitor::source::ProcFs;
use std::fs::OpenOptions;
use std::io::{self, IsTerminal, Write};
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::LevelFilter;

use cli::{Args, Commands};
use config::{resolve_config, show_config, validate_effective_config, Config};

/// Smallest terminal height for which headers are reprinted, before adding
/// one row per monitored process.
const MIN_REPRINT_ROWS: usize = 10;

/// Initializes tracing logging subsystem with configured log level.
///
/// Logs go to stderr; stdout carries the report.
fn setup_logging(config: &Config) {
    let log_level = match config.log_level.as_deref().unwrap_or("warn") {
        "off" => LevelFilter::OFF,
        "error" => LevelFilter::ERROR,
        "info" => LevelFilter::INFO,
        "debug" => LevelFilter::DEBUG,
        "trace" => LevelFilter::TRACE,
        _ => LevelFilter::WARN,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    info!("Logging initialized with level: {}", log_level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Raises the scheduling priority so sampling keeps its pace under load.
fn raise_priority() {
    // SAFETY: setpriority only reads its integer arguments.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, -19) };
    if rc != 0 {
        debug!(
            "Could not raise priority: {} - continuing with default priority",
            io::Error::last_os_error()
        );
    }
}

/// Height of the terminal on stdout, if stdout is one.
fn terminal_rows() -> Option<usize> {
    if !io::stdout().is_terminal() {
        return None;
    }
    let mut ws = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: TIOCGWINSZ writes a winsize into the valid pointer we pass.
    let rc = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) };
    if rc != 0 || ws.ws_row == 0 {
        return None;
    }
    Some(usize::from(ws.ws_row))
}

/// Opens the report destination and decides on colors and header reprinting.
fn open_reporter(
    config: &Config,
    process_count: usize,
) -> Result<TableReporter<Box<dyn Write + Send>>, Box<dyn std::error::Error>> {
    if let Some(path) = &config.output_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;
        info!("Appending report to {}", path.display());
        return Ok(TableReporter::new(Box::new(file), false, 0));
    }

    let colors = config.colors() && io::stdout().is_terminal();
    let rows = match terminal_rows() {
        Some(rows) if rows >= MIN_REPRINT_ROWS + process_count => rows,
        _ => 0,
    };
    debug!("Report to stdout: colors={}, rows={}", colors, rows);
    Ok(TableReporter::new(Box::new(io::stdout()), colors, rows))
}

/// Whether SIGINT was ignored when the process started, as under `nohup` or
/// for a background job of a non-interactive shell.
fn sigint_ignored() -> bool {
    // SAFETY: a null new action only queries the current disposition into
    // the zeroed struct we own.
    unsafe {
        let mut current: libc::sigaction = std::mem::zeroed();
        libc::sigaction(libc::SIGINT, std::ptr::null(), &mut current) == 0
            && current.sa_sigaction == libc::SIG_IGN
    }
}

/// Feeds SIGINT/SIGTERM into the cancellation token.
///
/// The first signal asks the loop to stop; the second exits immediately.
/// An inherited ignored SIGINT stays ignored.
fn spawn_signal_listener(cancel: CancellationToken) {
    let listen_sigint = !sigint_ignored();
    if !listen_sigint {
        info!("SIGINT is ignored, stopping on SIGTERM only");
    }

    tokio::spawn(async move {
        let mut terminate = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                return;
            }
        };

        loop {
            tokio::select! {
                res = signal::ctrl_c(), if listen_sigint => {
                    if let Err(e) = res {
                        error!("Failed to listen for Ctrl+C: {}", e);
                        return;
                    }
                    info!("Received SIGINT (Ctrl+C)");
                }
                _ = terminate.recv() => {
                    info!("Received SIGTERM");
                }
            }

            match cancel.request() {
                ShutdownRequest::Graceful => {
                    info!("Shutting down gracefully, interrupt again to quit immediately");
                }
                ShutdownRequest::Forced => {
                    warn!("Second shutdown request, exiting immediately");
                    std::process::exit(1);
                }
            }
        }
    });
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    let mut config = load_validated_config(&args)?;
    if matches!(args.command, Some(Commands::Check)) && args.log_level.is_none() {
        // The check results are reported through the log
        config.log_level = Some("info".into());
    }
    setup_logging(&config);

    if let (Some(_), Some(ignored)) = (args.interval, args.interval_positional) {
        warn!(
            "Interval argument '{}' is ignored as --interval is specified",
            ignored
        );
    }

    let pids = config.effective_pids(std::process::id());
    let proc_root = config.proc_root();
    let sys_root = config.sys_root();

    // Handle subcommands
    if let Some(Commands::Check) = &args.command {
        println!("🔍 Checking Runtime Requirements");
        println!("================================\n");
        match startup_checks::validate_requirements(&proc_root, &sys_root, &pids) {
            Ok(_) => {
                println!("\n✅ All requirements met");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("\n❌ Requirements check failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    info!("Starting herakles-mem-cpu-monitor");

    if let Err(e) = startup_checks::validate_requirements(&proc_root, &sys_root, &pids) {
        error!("❌ Startup validation failed: {}", e);
    }

    raise_priority();

    let cancel = CancellationToken::new();
    let source = ProcFs::new(proc_root, sys_root, config.scratch_buffer_kb());
    let mut monitor = match Monitor::new(source, config.monitor_settings(), &pids, cancel.clone()) {
        Ok(monitor) => monitor,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };
    let mut reporter = open_reporter(&config, pids.len())?;

    spawn_signal_listener(cancel);

    info!(
        "Monitoring {} process(es) every {:?}",
        pids.len(),
        config.interval()
    );
    let result = tokio::task::spawn_blocking(move || monitor.run(&mut reporter)).await?;

    match result {
        Ok(RunOutcome::Completed) => {
            info!("Monitor stopped");
            Ok(())
        }
        Ok(RunOutcome::Forced) => std::process::exit(1),
        Err(e) => {
            error!("Monitor failed: {}", e);
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    }
}
