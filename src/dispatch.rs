//! Consumers of curated messages
//!
//! The supervisor hands every forwarded payload to a [`Dispatcher`]. The
//! binary uses [`StdoutDispatcher`], which prints each message on its own
//! line.

use std::io::Write;

use bytes::Bytes;
use tracing::{info, warn};

/// Error returned by a dispatcher; the supervisor logs it and moves on.
pub type DispatchError = Box<dyn std::error::Error + Send + Sync>;

/// Handler for messages that matched their source's criteria.
///
/// # Example
///
/// ```rust
/// use bytes::Bytes;
/// use queuerator::dispatch::{DispatchError, Dispatcher};
///
/// struct CountingDispatcher;
///
/// #[async_trait::async_trait]
/// impl Dispatcher for CountingDispatcher {
///     async fn dispatch(&self, payload: Bytes) -> Result<(), DispatchError> {
///         println!("{} bytes", payload.len());
///         Ok(())
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait Dispatcher: Send + Sync {
    /// Process one curated payload.
    ///
    /// Payloads arrive one at a time; the next one waits until this returns.
    async fn dispatch(&self, payload: Bytes) -> Result<(), DispatchError>;
}

/// Prints `Curation yielded message: <payload>` to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutDispatcher;

impl StdoutDispatcher {
    /// Render the line printed for a payload.
    pub fn format_line(payload: &[u8]) -> String {
        format!("Curation yielded message: {}", String::from_utf8_lossy(payload))
    }
}

#[async_trait::async_trait]
impl Dispatcher for StdoutDispatcher {
    async fn dispatch(&self, payload: Bytes) -> Result<(), DispatchError> {
        info!(bytes = payload.len(), "Dispatching curated message");
        let line = Self::format_line(&payload);

        let written = {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", line)
        };
        if let Err(e) = written {
            warn!(error = %e, "Failed to write curated message");
            return Err(e.into());
        }
        Ok(())
    }
}

/// Dispatcher recording every payload, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct CollectingDispatcher {
    received: std::sync::Mutex<Vec<Bytes>>,
    delay: Option<std::time::Duration>,
}

#[cfg(test)]
impl CollectingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before recording each payload, to simulate a slow consumer.
    pub fn with_delay(delay: std::time::Duration) -> Self {
        Self {
            received: Default::default(),
            delay: Some(delay),
        }
    }

    pub fn received(&self) -> Vec<Bytes> {
        self.received
            .lock()
            .map(|items| items.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl Dispatcher for CollectingDispatcher {
    async fn dispatch(&self, payload: Bytes) -> Result<(), DispatchError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.received
            .lock()
            .map_err(|_| "collector poisoned")?
            .push(payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line() {
        assert_eq!(
            StdoutDispatcher::format_line(br#"{"a":1}"#),
            r#"Curation yielded message: {"a":1}"#
        );
    }

    #[test]
    fn test_format_line_lossy() {
        let line = StdoutDispatcher::format_line(&[0x7b, 0xff, 0x7d]);
        assert!(line.starts_with("Curation yielded message: {"));
        assert!(line.ends_with('}'));
    }

    #[tokio::test]
    async fn test_stdout_dispatcher_succeeds() {
        let result = StdoutDispatcher
            .dispatch(Bytes::from_static(br#"{"ok":true}"#))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_collecting_dispatcher_keeps_order() {
        let dispatcher = CollectingDispatcher::new();
        dispatcher.dispatch(Bytes::from_static(b"1")).await.unwrap();
        dispatcher.dispatch(Bytes::from_static(b"2")).await.unwrap();
        assert_eq!(
            dispatcher.received(),
            vec![Bytes::from_static(b"1"), Bytes::from_static(b"2")]
        );
    }
}
