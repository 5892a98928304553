//! Ingestion supervisor
//!
//! The supervisor owns the shared output channel and the cancellation
//! token. It launches one task per source into a [`JoinSet`], hands every
//! forwarded payload to a [`Dispatcher`], and reaps adapters as they end.
//!
//! Shutdown is structured: the token is cancelled, the remaining tasks are
//! joined under the grace period, and whatever is still running afterwards
//! is aborted and reported as hung.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatch::Dispatcher;
use crate::error::{QueueratorError, Result};
use crate::source::Source;

/// Default capacity of the output channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1;

/// Default time adapters get to stop after cancellation.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(1000);

/// Runtime settings of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Capacity of the shared output channel; sends block when it is full
    pub channel_capacity: usize,
    /// Time adapters get to stop after cancellation
    pub grace_period: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl SupervisorConfig {
    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns `QueueratorError::Config` if the channel capacity is zero.
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(QueueratorError::Config(
                "channel_capacity must be greater than 0".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

/// A source that ended with an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    /// Source name
    pub source: String,
    /// Rendered error
    pub reason: String,
}

/// Final state of every source after shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Sources that returned cleanly
    pub stopped: Vec<String>,
    /// Sources that returned an error or panicked
    pub failed: Vec<SourceFailure>,
    /// Sources still running when the grace period expired
    pub hung: Vec<String>,
}

impl ShutdownReport {
    /// True when no source outlived the grace period.
    pub fn is_complete(&self) -> bool {
        self.hung.is_empty()
    }

    /// Total number of sources accounted for.
    pub fn total(&self) -> usize {
        self.stopped.len() + self.failed.len() + self.hung.len()
    }
}

impl fmt::Display for ShutdownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} stopped, {} failed, {} hung",
            self.stopped.len(),
            self.failed.len(),
            self.hung.len()
        )
    }
}

#[derive(Debug)]
enum Outcome {
    Stopped,
    Failed(String),
}

type TaskResult = (usize, Outcome);

/// Bookkeeping of which sources are still running and how the others ended.
#[derive(Debug, Default)]
struct Ledger {
    running: BTreeMap<usize, String>,
    finished: BTreeMap<usize, (String, Outcome)>,
}

impl Ledger {
    fn record(&mut self, joined: std::result::Result<TaskResult, JoinError>) {
        let (index, outcome) = match joined {
            Ok(result) => result,
            // Tasks are only aborted after the ledger is final.
            Err(e) => {
                debug!(error = %e, "Source task ended without a result");
                return;
            }
        };

        let Some(name) = self.running.remove(&index) else {
            return;
        };
        match &outcome {
            Outcome::Stopped => info!(source = %name, "Source stopped"),
            Outcome::Failed(reason) => error!(source = %name, error = %reason, "Source failed"),
        }
        self.finished.insert(index, (name, outcome));
    }

    fn into_report(self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        for (_, (name, outcome)) in self.finished {
            match outcome {
                Outcome::Stopped => report.stopped.push(name),
                Outcome::Failed(reason) => report.failed.push(SourceFailure {
                    source: name,
                    reason,
                }),
            }
        }
        report.hung = self.running.into_values().collect();
        report
    }
}

/// Runs every configured source and dispatches what they forward.
pub struct Supervisor {
    config: SupervisorConfig,
    sources: Vec<Arc<dyn Source>>,
}

impl Supervisor {
    /// Create a supervisor.
    ///
    /// # Arguments
    ///
    /// * `config` - Channel capacity and grace period
    /// * `sources` - Adapters to run, one task each
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn new(config: SupervisorConfig, sources: Vec<Arc<dyn Source>>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, sources })
    }

    /// Number of sources this supervisor runs.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Run until `shutdown` resolves or every source has ended.
    ///
    /// Forwarded payloads are dispatched one at a time, in arrival order.
    /// Dispatch errors are logged and do not stop the loop. A dispatch still
    /// pending when `shutdown` resolves is dropped.
    ///
    /// # Returns
    ///
    /// The final state of every source.
    pub async fn run<F>(self, shutdown: F, dispatcher: &dyn Dispatcher) -> ShutdownReport
    where
        F: Future<Output = ()>,
    {
        let (tx, mut rx) = mpsc::channel(self.config.channel_capacity);
        let cancel = CancellationToken::new();
        let mut tasks: JoinSet<TaskResult> = JoinSet::new();
        let mut ledger = Ledger::default();

        for (index, source) in self.sources.into_iter().enumerate() {
            ledger.running.insert(index, source.name().to_string());
            let cancel = cancel.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                let result = AssertUnwindSafe(source.connect(cancel, tx))
                    .catch_unwind()
                    .await;
                let outcome = match result {
                    Ok(Ok(())) => Outcome::Stopped,
                    Ok(Err(e)) => Outcome::Failed(e.to_string()),
                    Err(_) => Outcome::Failed("source task panicked".to_string()),
                };
                (index, outcome)
            });
        }
        // Only adapters hold senders now, so `recv` ends once they all stop.
        drop(tx);

        info!(
            sources = ledger.running.len(),
            channel_capacity = self.config.channel_capacity,
            "Supervisor started"
        );

        tokio::pin!(shutdown);
        let mut drained = false;
        loop {
            if drained && tasks.is_empty() {
                info!("Every source has stopped");
                break;
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                payload = rx.recv(), if !drained => match payload {
                    Some(payload) => tokio::select! {
                        biased;
                        _ = &mut shutdown => {
                            info!("Shutdown requested while dispatching");
                            break;
                        }
                        dispatched = dispatcher.dispatch(payload) => {
                            if let Err(e) = dispatched {
                                warn!(error = %e, "Dispatcher failed");
                            }
                        }
                    },
                    None => drained = true,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    ledger.record(joined);
                }
            }
        }

        cancel.cancel();
        // Adapters blocked on a full channel see the close and stop.
        drop(rx);

        let grace = self.config.grace_period;
        let joined = tokio::time::timeout(grace, async {
            while let Some(joined) = tasks.join_next().await {
                ledger.record(joined);
            }
        })
        .await;

        if joined.is_err() {
            warn!(
                grace_period_ms = grace.as_millis() as u64,
                hung = ledger.running.len(),
                "Sources did not stop within the grace period, aborting"
            );
        }
        tasks.shutdown().await;

        let report = ledger.into_report();
        info!(report = %report, "Supervisor stopped");
        report
    }
}
