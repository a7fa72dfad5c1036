//! CLI entry point for Transcode Watcher
//!
//! Parses command line arguments, sets up logging and runs the dispatch loop
//! until interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use transcode_watcher::{init_tracing, Config, Daemon, LogFile};

use clap::Parser;

/// Transcode Watcher - watch a directory and transcode finished files with HandBrake
#[derive(Parser, Debug)]
#[command(name = "transcode-watcher")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a non-standard configuration file (`~` expands to the home directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Continue with screen logging only if the log file cannot be opened
    #[arg(short = 'f', long)]
    fallback_log: bool,

    /// Skip startup checks (encoder binary, encoder arguments). For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_file = LogFile::new();
    if let Err(e) = init_tracing(log_file.clone()) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    tracing::info!("---- ---> {} <--- -----", chrono::Local::now().format("%c"));

    let location = Config::locate(args.config.as_deref());
    match &location {
        Some(path) => tracing::info!("Custom configuration: {}", path.display()),
        None => tracing::info!("Custom configuration: none, using defaults"),
    }

    let config = match Config::load(location.as_deref()) {
        Ok(config) => config,
        Err(e) => return fatal(&log_file, &format!("Failed to load configuration: {}", e)),
    };

    match &config.log_output {
        Some(prefix) => {
            tracing::info!("Opening log file...");
            match log_file.open(prefix) {
                Ok(path) => tracing::info!("Logging to {}", path.display()),
                Err(e) if args.fallback_log => {
                    tracing::warn!(
                        "Failed to open log file ({}), continue with screen log only.",
                        e
                    );
                }
                Err(e) => {
                    return fatal(&log_file, &format!("Failed to open log file: {}", e));
                }
            }
        }
        None => tracing::info!("Screen log only."),
    }

    let daemon = if args.skip_checks {
        tracing::warn!("Skipping startup checks (--skip-checks enabled)");
        Ok(Daemon::new_without_checks(config))
    } else {
        Daemon::new(config)
    };
    let mut daemon = match daemon {
        Ok(daemon) => daemon,
        Err(e) => return fatal(&log_file, &format!("Failed to initialize daemon: {}", e)),
    };

    tracing::info!(
        input = %daemon.config.input_path.display(),
        output = %daemon.config.output_path.display(),
        concurrent = daemon.config.concurrent,
        "Service ready..."
    );

    daemon.run_until(shutdown_signal()).await;

    tracing::info!("Service terminated.");
    log_file.close();
    ExitCode::SUCCESS
}

fn fatal(log_file: &LogFile, message: &str) -> ExitCode {
    tracing::error!("{}", message);
    tracing::info!("Service terminated.");
    log_file.close();
    ExitCode::FAILURE
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Cannot listen for interrupt: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
}
