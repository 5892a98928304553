//! Queuerator - curate broker messages with criteria filters
//!
#![doc = "Main entry point for the Queuerator binary."]

use std::process::ExitCode;

use anyhow::Result;
use tracing::{error, info};

use queuerator::cli::Cli;
use queuerator::config::Config;
use queuerator::dispatch::StdoutDispatcher;
use queuerator::logging::init_logging;
use queuerator::supervisor::Supervisor;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse_args();

    init_logging(&cli.logging())?;

    let config = Config::load(&cli.config)?;
    config.validate()?;

    println!("{}", config.resolved_message());

    if cli.check {
        for (index, source) in config.sources.iter().enumerate() {
            println!("  [{}] {}", index, source.summary());
        }
        if config.skipped > 0 {
            println!(
                "  {} descriptor(s) skipped: protocol unknown or unsupported",
                config.skipped
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    let sources = config.build_sources(cli.receive())?;
    let supervisor = Supervisor::new(cli.supervisor(), sources)?;
    info!(sources = supervisor.source_count(), "Starting ingestion");

    let shutdown = shutdown_signal()?;
    let report = supervisor.run(shutdown, &StdoutDispatcher).await;

    if report.is_complete() {
        info!(sources = report.total(), report = %report, "Shutdown complete");
        Ok(ExitCode::SUCCESS)
    } else {
        error!(
            sources = report.total(),
            hung = ?report.hung,
            "Sources still running after the grace period"
        );
        Ok(ExitCode::FAILURE)
    }
}

/// Resolves on the first SIGINT or SIGTERM.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl std::future::Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    })
}

/// Resolves on the first Ctrl-C.
#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl std::future::Future<Output = ()>> {
    Ok(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C");
        }
    })
}
