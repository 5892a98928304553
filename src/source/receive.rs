//! Receive/filter/forward loop shared by every protocol
//!
//! Each iteration waits for one delivery, bounded by the poll timeout so
//! cancellation is noticed promptly. A delivery is then settled with the
//! broker:
//!
//! 1. Payload absent, not JSON, or not a JSON object: reject, do not forward
//! 2. Otherwise: accept, whatever the filter outcome
//! 3. Criteria match: push the raw payload into the output channel
//!
//! The push blocks while the output channel is full. A slow consumer
//! therefore delays the next receive (and the next acknowledgement) of
//! this source.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{Delivery, Session, SourceError};
use crate::criteria::{CriteriaGroup, JsonObject};

/// Default upper bound on a single receive poll.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Receive loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveSettings {
    /// Upper bound on a single receive poll
    pub poll_timeout: Duration,
}

impl Default for ReceiveSettings {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Counters collected by one run of the receive loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveStats {
    /// Deliveries received from the broker
    pub received: u64,
    /// Deliveries positively acknowledged
    pub accepted: u64,
    /// Deliveries rejected because they could not be decoded
    pub rejected: u64,
    /// Payloads pushed into the output channel
    pub forwarded: u64,
    /// Receive errors other than timeouts
    pub errors: u64,
}

/// Decode a payload into the JSON object criteria are evaluated against.
///
/// # Errors
///
/// Returns `SourceError::MessageDecode` when the payload is absent, is not
/// valid JSON, or is valid JSON but not an object.
///
/// # Examples
///
/// ```
/// use queuerator::source::receive::decode_payload;
///
/// assert!(decode_payload(Some(br#"{"a": 1}"#.as_slice())).is_ok());
/// assert!(decode_payload(Some(b"[1, 2]".as_slice())).is_err());
/// assert!(decode_payload(None).is_err());
/// ```
pub fn decode_payload(payload: Option<&[u8]>) -> Result<JsonObject, SourceError> {
    let data = match payload {
        Some(data) if !data.is_empty() => data,
        _ => return Err(SourceError::MessageDecode("no data".to_string())),
    };

    match serde_json::from_slice::<serde_json::Value>(data) {
        Ok(serde_json::Value::Object(obj)) => Ok(obj),
        Ok(other) => Err(SourceError::MessageDecode(format!(
            "expected a JSON object, got {}",
            json_type_name(&other)
        ))),
        Err(e) => Err(SourceError::MessageDecode(format!(
            "could not read data: {}",
            e
        ))),
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Run the receive loop until `cancel` fires, then close the session.
///
/// Receive errors other than the poll timeout are logged and the loop
/// continues immediately. The loop also stops if `out` has no receiver
/// left.
///
/// # Arguments
///
/// * `session` - Connected broker session; closed before returning
/// * `criteria` - Filter applied to every decoded message
/// * `settings` - Loop settings
/// * `cancel` - Shared cancellation token
/// * `out` - Shared output channel
///
/// # Returns
///
/// Counters describing what the loop did.
pub async fn run_receive_loop<S: Session>(
    mut session: S,
    criteria: &CriteriaGroup,
    settings: &ReceiveSettings,
    cancel: &CancellationToken,
    out: &mpsc::Sender<Bytes>,
) -> ReceiveStats {
    let mut stats = ReceiveStats::default();

    loop {
        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            polled = tokio::time::timeout(settings.poll_timeout, session.recv()) => polled,
        };

        let Delivery { payload, handle } = match polled {
            // Nothing arrived within the poll window
            Err(_elapsed) => continue,
            Ok(Err(e)) => {
                stats.errors += 1;
                error!(error = %e, "Error while receiving new message");
                continue;
            }
            Ok(Ok(delivery)) => delivery,
        };
        stats.received += 1;

        let obj = match decode_payload(payload.as_deref()) {
            Ok(obj) => obj,
            Err(e) => {
                warn!(error = %e, "Rejecting message");
                match session.reject(handle).await {
                    Ok(()) => stats.rejected += 1,
                    Err(e) => error!(error = %e, "Failed to reject message"),
                }
                continue;
            }
        };

        match session.accept(handle).await {
            Ok(()) => stats.accepted += 1,
            Err(e) => error!(error = %e, "Failed to accept message"),
        }

        if !criteria.evaluate(&obj) {
            trace!("Message does not satisfy criteria");
            continue;
        }

        // decode_payload only succeeds on a present payload
        let Some(payload) = payload else {
            continue;
        };
        debug!(bytes = payload.len(), "Message satisfies criteria");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = out.send(payload) => {
                if sent.is_err() {
                    warn!("Output channel closed, stopping receive loop");
                    break;
                }
                stats.forwarded += 1;
            }
        }
    }

    info!("Closing session");
    if let Err(e) = session.close().await {
        error!(error = %e, "Error while closing session");
    }

    stats
}
