//! In-process fake sessions and sources for tests
//!
//! [`FakeSession::new`] returns a `(FakeSession, FakeSessionHandle)` pair.
//! The session is wired into the code under test, and the test side uses
//! the handle to:
//!
//! - Script deliveries: `handle.push(json)`, `handle.push_empty()`
//! - Script receive failures: `handle.push_error(reason)`
//! - Observe settlement: `handle.accepted()`, `handle.rejected()`
//! - Observe shutdown: `handle.is_closed()`
//!
//! [`FakeConnector`] hands a prepared session to an [`Adapter`], or fails
//! or hangs on connect. [`StubbornSource`] ignores cancellation altogether
//! and is used to prove that the supervisor detects hung adapters.
//!
//! [`Adapter`]: super::Adapter

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Connector, Delivery, Session, SessionError, Source, SourceError};

type Scripted = Result<Delivery<u64>, SessionError>;

#[derive(Debug, Default)]
struct Counters {
    pending: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    closed: AtomicBool,
}

/// Fake broker session fed by a [`FakeSessionHandle`].
#[derive(Debug)]
pub struct FakeSession {
    inbound_rx: mpsc::UnboundedReceiver<Scripted>,
    counters: Arc<Counters>,
    hang_on_close: bool,
}

/// Test-side handle of a [`FakeSession`].
#[derive(Debug, Clone)]
pub struct FakeSessionHandle {
    inbound_tx: mpsc::UnboundedSender<Scripted>,
    counters: Arc<Counters>,
    next_tag: Arc<AtomicU64>,
}

impl FakeSession {
    /// Create a `(FakeSession, FakeSessionHandle)` pair.
    pub fn new() -> (Self, FakeSessionHandle) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());

        let session = Self {
            inbound_rx,
            counters: Arc::clone(&counters),
            hang_on_close: false,
        };
        let handle = FakeSessionHandle {
            inbound_tx,
            counters,
            next_tag: Arc::new(AtomicU64::new(1)),
        };

        (session, handle)
    }

    /// Make `close` never complete, simulating a broker that stalls on shutdown.
    pub fn hang_on_close(mut self) -> Self {
        self.hang_on_close = true;
        self
    }
}

impl FakeSessionHandle {
    fn script(&self, item: Scripted) {
        self.counters.pending.fetch_add(1, Ordering::SeqCst);
        // The session may already be gone; the item is then simply dropped.
        let _ = self.inbound_tx.send(item);
    }

    fn delivery(&self, payload: Option<Bytes>) -> Scripted {
        Ok(Delivery {
            payload,
            handle: self.next_tag.fetch_add(1, Ordering::SeqCst),
        })
    }

    /// Queue a delivery with the given payload.
    pub fn push(&self, payload: &str) {
        self.push_bytes(Bytes::copy_from_slice(payload.as_bytes()));
    }

    /// Queue a delivery with raw payload bytes.
    pub fn push_bytes(&self, payload: Bytes) {
        let item = self.delivery(Some(payload));
        self.script(item);
    }

    /// Queue a delivery without a payload.
    pub fn push_empty(&self) {
        let item = self.delivery(None);
        self.script(item);
    }

    /// Queue a receive error.
    pub fn push_error(&self, reason: &str) {
        self.script(Err(SessionError::Closed(reason.to_string())));
    }

    /// Scripted items not yet received by the session.
    pub fn pending(&self) -> u64 {
        self.counters.pending.load(Ordering::SeqCst)
    }

    /// Deliveries accepted so far.
    pub fn accepted(&self) -> u64 {
        self.counters.accepted.load(Ordering::SeqCst)
    }

    /// Deliveries rejected so far.
    pub fn rejected(&self) -> u64 {
        self.counters.rejected.load(Ordering::SeqCst)
    }

    /// Whether the session was closed.
    pub fn is_closed(&self) -> bool {
        self.counters.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for FakeSession {
    type Handle = u64;

    async fn recv(&mut self) -> Result<Delivery<u64>, SessionError> {
        match self.inbound_rx.recv().await {
            Some(item) => {
                self.counters.pending.fetch_sub(1, Ordering::SeqCst);
                item
            }
            // Every handle is gone: behave like an idle broker
            None => std::future::pending().await,
        }
    }

    async fn accept(&mut self, _handle: u64) -> Result<(), SessionError> {
        self.counters.accepted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reject(&mut self, _handle: u64) -> Result<(), SessionError> {
        self.counters.rejected.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(self) -> Result<(), SessionError> {
        if self.hang_on_close {
            std::future::pending::<()>().await;
        }
        self.counters.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
enum ConnectBehavior {
    Ready(Mutex<Option<FakeSession>>),
    Failing(String),
    Hanging,
}

/// Connector handing out a prepared [`FakeSession`].
#[derive(Debug)]
pub struct FakeConnector {
    behavior: ConnectBehavior,
}

impl FakeConnector {
    /// Connector that yields `session` on the first connect.
    pub fn new(session: FakeSession) -> Self {
        Self {
            behavior: ConnectBehavior::Ready(Mutex::new(Some(session))),
        }
    }

    /// Connector whose connect always fails with `reason`.
    pub fn failing(reason: &str) -> Self {
        Self {
            behavior: ConnectBehavior::Failing(reason.to_string()),
        }
    }

    /// Connector whose connect never completes.
    pub fn hanging() -> Self {
        Self {
            behavior: ConnectBehavior::Hanging,
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self) -> Result<FakeSession, SessionError> {
        match &self.behavior {
            ConnectBehavior::Ready(slot) => {
                let session = slot.lock().ok().and_then(|mut slot| slot.take());
                session.ok_or_else(|| SessionError::Closed("fake session already used".to_string()))
            }
            ConnectBehavior::Failing(reason) => Err(SessionError::Closed(reason.clone())),
            ConnectBehavior::Hanging => std::future::pending().await,
        }
    }
}

/// Source that never observes cancellation.
#[derive(Debug)]
pub struct StubbornSource {
    name: String,
}

impl StubbornSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Source for StubbornSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(
        &self,
        _cancel: CancellationToken,
        _out: mpsc::Sender<Bytes>,
    ) -> Result<(), SourceError> {
        std::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_deliveries_arrive_in_order() {
        let (mut session, handle) = FakeSession::new();
        handle.push("first");
        handle.push_empty();
        handle.push_error("boom");
        assert_eq!(handle.pending(), 3);

        let first = session.recv().await.unwrap();
        assert_eq!(first.payload.as_deref(), Some(b"first".as_slice()));
        let second = session.recv().await.unwrap();
        assert!(second.payload.is_none());
        assert_ne!(first.handle, second.handle);
        assert!(session.recv().await.is_err());
        assert_eq!(handle.pending(), 0);
    }

    #[tokio::test]
    async fn test_settlement_counters_and_close() {
        let (mut session, handle) = FakeSession::new();
        session.accept(1).await.unwrap();
        session.reject(2).await.unwrap();
        session.reject(3).await.unwrap();
        assert_eq!(handle.accepted(), 1);
        assert_eq!(handle.rejected(), 2);

        assert!(!handle.is_closed());
        session.close().await.unwrap();
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_connector_hands_out_session_once() {
        let (session, _handle) = FakeSession::new();
        let connector = FakeConnector::new(session);
        assert!(connector.connect().await.is_ok());
        assert!(connector.connect().await.is_err());
    }
}
