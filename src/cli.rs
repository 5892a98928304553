//! Command-line interface definition for Queuerator
//!
//! This module defines the CLI structure using clap's derive API.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::logging::LoggingConfig;
use crate::source::ReceiveSettings;
use crate::supervisor::SupervisorConfig;

/// Queuerator - curate broker messages with criteria filters
///
/// Subscribes to every AMQP and MQTT source in the config file and prints
/// the messages that satisfy each source's criteria.
#[derive(Parser, Debug, Clone)]
#[command(name = "queuerator")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the config file (e.g. ./config.json)
    #[arg(short, long, env = "QUEUERATOR_CONFIG")]
    pub config: PathBuf,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Also append logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Capacity of the output channel shared by all sources
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub channel_capacity: u64,

    /// Time sources get to stop after a shutdown signal
    #[arg(long, default_value_t = 1000)]
    pub grace_period_ms: u64,

    /// Upper bound on a single broker receive poll
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_timeout_ms: u64,

    /// Validate the config file and print the resolved sources without connecting
    #[arg(long)]
    pub check: bool,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Logging settings selected on the command line.
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            json_format: self.json_logs,
            file_path: self.log_file.clone(),
        }
    }

    /// Supervisor settings selected on the command line.
    pub fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            channel_capacity: usize::try_from(self.channel_capacity).unwrap_or(usize::MAX),
            grace_period: Duration::from_millis(self.grace_period_ms),
        }
    }

    /// Receive loop settings selected on the command line.
    pub fn receive(&self) -> ReceiveSettings {
        ReceiveSettings {
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
        }
    }
}
