//! Broker source adapters
//!
//! Every configured source runs one adapter. The adapter connects to its
//! broker, receives messages in a loop, filters them with the source's
//! criteria, acknowledges each one, and forwards matches into the shared
//! output channel owned by the supervisor.
//!
//! # Layers
//!
//! - [`Connector`] establishes a broker session (connection, channel or
//!   subscription). Connection failures are fatal to the one source.
//! - [`Session`] is an already-connected receiver exposing
//!   `recv`/`accept`/`reject`/`close`.
//! - [`receive::run_receive_loop`] is the receive/filter/forward loop
//!   shared by every protocol.
//! - [`Adapter`] glues a connector, a criteria tree and the loop together
//!   and implements [`Source`], the contract the supervisor drives.
//!
//! # Protocols
//!
//! - [`amqp`]: AMQP 1.0 queues through `fe2o3-amqp`
//! - [`mqtt`]: MQTT topic subscriptions through `rumqttc`

pub mod amqp;
pub mod mqtt;
pub mod receive;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use crate::criteria::CriteriaGroup;
pub use receive::{run_receive_loop, ReceiveSettings, ReceiveStats};

/// Errors raised by a broker session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// AMQP 1.0 client error, prefixed with the failing step
    #[error("AMQP error: {0}")]
    Amqp(String),

    /// MQTT client request error
    #[error("MQTT client error: {0}")]
    MqttClient(#[from] rumqttc::ClientError),

    /// MQTT connection or event loop error
    #[error("MQTT connection error: {0}")]
    MqttConnection(#[from] rumqttc::ConnectionError),

    /// Broker URL cannot be used by the client
    #[error("Invalid broker URL: {0}")]
    InvalidUrl(String),

    /// Session stopped delivering messages
    #[error("Session closed: {0}")]
    Closed(String),
}

/// Errors returned by a source adapter.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Broker dial or subscription failed; fatal to this source only
    #[error("Connection error for source {name}: {error}")]
    Connection {
        /// Name of the source that failed
        name: String,
        /// Underlying session error
        #[source]
        error: SessionError,
    },

    /// Message payload is absent, not JSON, or not a JSON object
    #[error("Message decode error: {0}")]
    MessageDecode(String),
}

/// A message received from a broker, with the handle used to settle it.
#[derive(Debug)]
pub struct Delivery<H> {
    /// Raw payload; `None` when the message carries no body
    pub payload: Option<Bytes>,
    /// Protocol-specific handle passed back to accept or reject
    pub handle: H,
}

/// An established broker session.
#[async_trait]
pub trait Session: Send {
    /// Handle identifying one delivery for acknowledgement
    type Handle: Send;

    /// Wait for the next message.
    ///
    /// Must be cancel-safe: the receive loop drops this future when its
    /// poll timeout elapses or cancellation is requested.
    async fn recv(&mut self) -> Result<Delivery<Self::Handle>, SessionError>;

    /// Positively acknowledge a delivery.
    async fn accept(&mut self, handle: Self::Handle) -> Result<(), SessionError>;

    /// Negatively acknowledge a delivery; it must not be redelivered.
    async fn reject(&mut self, handle: Self::Handle) -> Result<(), SessionError>;

    /// Close receiver, session and connection, in that order.
    async fn close(self) -> Result<(), SessionError>;
}

/// Establishes sessions against one broker endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Session type produced by this connector
    type Session: Session;

    /// Dial the broker and set up the subscription.
    async fn connect(&self) -> Result<Self::Session, SessionError>;
}

/// The contract the supervisor drives for each configured source.
#[async_trait]
pub trait Source: Send + Sync {
    /// Name used in logs and shutdown reports
    fn name(&self) -> &str;

    /// Connect and run until `cancel` fires.
    ///
    /// Matching payloads are pushed into `out`. Returns `Ok(())` after a
    /// clean shutdown.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Connection` if the broker cannot be reached.
    async fn connect(
        &self,
        cancel: CancellationToken,
        out: mpsc::Sender<Bytes>,
    ) -> Result<(), SourceError>;
}

/// Source adapter combining a connector with a criteria tree.
pub struct Adapter<C> {
    name: String,
    criteria: CriteriaGroup,
    connector: C,
    settings: ReceiveSettings,
}

impl<C: Connector> Adapter<C> {
    /// Create an adapter.
    ///
    /// # Arguments
    ///
    /// * `name` - Display name, usually the broker URL without credentials
    /// * `criteria` - Filter applied to every decoded message
    /// * `connector` - Protocol connector
    /// * `settings` - Receive loop settings
    pub fn new(
        name: impl Into<String>,
        criteria: CriteriaGroup,
        connector: C,
        settings: ReceiveSettings,
    ) -> Self {
        Self {
            name: name.into(),
            criteria,
            connector,
            settings,
        }
    }

    async fn run(
        &self,
        cancel: CancellationToken,
        out: mpsc::Sender<Bytes>,
    ) -> Result<(), SourceError> {
        info!(criteria = %self.criteria.summary(), "Connecting source");

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            session = self.connector.connect() => Some(session),
        };

        let session = match connected {
            None => {
                info!("Cancelled before connection was established");
                return Ok(());
            }
            Some(Ok(session)) => session,
            Some(Err(error)) => {
                error!(error = %error, "Failed to connect source");
                return Err(SourceError::Connection {
                    name: self.name.clone(),
                    error,
                });
            }
        };

        info!("Source connected, entering receive loop");
        let stats = run_receive_loop(session, &self.criteria, &self.settings, &cancel, &out).await;

        info!(
            received = stats.received,
            accepted = stats.accepted,
            rejected = stats.rejected,
            errors = stats.errors,
            forwarded = stats.forwarded,
            "Source stopped"
        );
        Ok(())
    }
}

#[async_trait]
impl<C: Connector> Source for Adapter<C> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(
        &self,
        cancel: CancellationToken,
        out: mpsc::Sender<Bytes>,
    ) -> Result<(), SourceError> {
        let span = info_span!("source", source = %self.name);
        self.run(cancel, out).instrument(span).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{Criterion, Operand, Value};
    use crate::source::fake::{FakeConnector, FakeSession};
    use std::time::Duration;

    fn level_above(threshold: f64) -> CriteriaGroup {
        CriteriaGroup::all(vec![Criterion::new(
            "level",
            Operand::Gt,
            Value::Number(threshold),
        )
        .into()])
    }

    #[test]
    fn test_source_error_display() {
        let err = SourceError::Connection {
            name: "amqp://localhost".to_string(),
            error: SessionError::Closed("refused".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Connection error for source amqp://localhost: Session closed: refused"
        );

        let err = SourceError::MessageDecode("no data".to_string());
        assert_eq!(err.to_string(), "Message decode error: no data");
    }

    #[test]
    fn test_errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SessionError>();
        assert_send_sync::<SourceError>();
    }

    #[tokio::test]
    async fn test_adapter_reports_connection_failure() {
        let adapter = Adapter::new(
            "broken",
            level_above(1.0),
            FakeConnector::failing("connection refused"),
            ReceiveSettings::default(),
        );
        let (tx, _rx) = mpsc::channel(1);

        let err = adapter
            .connect(CancellationToken::new(), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Connection { ref name, .. } if name == "broken"));
    }

    #[tokio::test]
    async fn test_adapter_forwards_matches_until_cancelled() {
        let (session, handle) = FakeSession::new();
        let adapter = Adapter::new(
            "fake",
            level_above(2.0),
            FakeConnector::new(session),
            ReceiveSettings::default(),
        );
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        handle.push(r#"{"level": 1}"#);
        handle.push(r#"{"level": 3}"#);

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { adapter.connect(cancel, tx).await })
        };

        let forwarded = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(&forwarded[..], br#"{"level": 3}"#);

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("adapter did not stop")
            .expect("adapter panicked");
        assert!(result.is_ok());
        assert!(handle.is_closed());
        assert_eq!(handle.accepted(), 2);
    }

    #[tokio::test]
    async fn test_adapter_cancelled_while_connecting() {
        let adapter = Adapter::new(
            "hanging",
            CriteriaGroup::default(),
            FakeConnector::hanging(),
            ReceiveSettings::default(),
        );
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), adapter.connect(cancel, tx))
            .await
            .expect("adapter ignored cancellation");
        assert!(result.is_ok());
    }

    #[test]
    fn test_adapter_name() {
        let adapter = Adapter::new(
            "fake",
            level_above(2.0),
            FakeConnector::hanging(),
            ReceiveSettings::default(),
        );
        assert_eq!(adapter.name(), "fake");
    }
}
