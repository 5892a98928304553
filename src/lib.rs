//! Queuerator - broker message curation library
//!
//! Queuerator subscribes to AMQP queues and MQTT topics, evaluates each
//! JSON message against a per-source criteria tree, and forwards the
//! messages that match to a single consumer.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `criteria`: Criteria values, tree, parser, path resolver and comparator
//! - `source`: Broker adapters and the shared receive/filter/forward loop
//! - `supervisor`: Runs every source, dispatches matches, coordinates shutdown
//! - `dispatch`: Consumers of curated messages
//! - `config`: Source descriptors and protocol detection
//! - `logging`: Tracing subscriber setup
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use queuerator::dispatch::StdoutDispatcher;
//! use queuerator::source::ReceiveSettings;
//! use queuerator::{Config, Supervisor, SupervisorConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("sources.json")?;
//!     config.validate()?;
//!
//!     let sources = config.build_sources(ReceiveSettings::default())?;
//!     let supervisor = Supervisor::new(SupervisorConfig::default(), sources)?;
//!     let shutdown = async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     };
//!     let report = supervisor.run(shutdown, &StdoutDispatcher).await;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod criteria;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod source;
pub mod supervisor;

// Re-export commonly used types
pub use config::{Config, SourceConfig};
pub use criteria::{CriteriaGroup, CriteriaNode, Criterion, Operand, Value};
pub use error::{QueueratorError, Result};
pub use source::{Source, SourceError};
pub use supervisor::{ShutdownReport, Supervisor, SupervisorConfig};
