//! # Messaging Service Trait
//!
//! Provider-agnostic broker operations used by queue agents. Implementations must
//! support:
//!
//! - Idempotent queue creation
//! - Sending one envelope (a JSON payload wrapping an ordered batch) per call
//! - Receiving one envelope with a bounded wait and a visibility timeout
//! - Acknowledging receipts once the consumer is done with them
//!
//! Envelopes that are received but never acknowledged become visible again after
//! the visibility timeout; redelivery policy is entirely the broker's.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MessagingError, MessagingResult};
use crate::constants::MAX_QUEUE_NAME_LENGTH;

/// Identifier the provider assigned to a sent envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque token used to acknowledge a delivery
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<MessageId> for ReceiptHandle {
    fn from(id: MessageId) -> Self {
        Self(id.0.to_string())
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One envelope handed out by [`MessagingService::receive`]
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Raw envelope payload; framing is validated by the receiving agent
    pub payload: serde_json::Value,
    /// Handle used to acknowledge this delivery
    pub receipt: ReceiptHandle,
    /// How many times the broker has handed this envelope out, including now
    pub receive_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// How deliveries are acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// Each delivery is consumed as soon as it is received
    Auto,
    /// Deliveries are acknowledged only after the batch containing them was
    /// processed successfully
    #[default]
    Explicit,
}

impl fmt::Display for AckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckMode::Auto => f.write_str("auto"),
            AckMode::Explicit => f.write_str("explicit"),
        }
    }
}

#[async_trait]
pub trait MessagingService: Send + Sync + 'static {
    /// Create a queue if it doesn't exist
    async fn ensure_queue(&self, queue_name: &str) -> MessagingResult<()>;

    /// Send one envelope to a queue
    async fn send_envelope(
        &self,
        queue_name: &str,
        payload: serde_json::Value,
    ) -> MessagingResult<MessageId>;

    /// Receive the next visible envelope, waiting at most `wait`
    ///
    /// Returns `Ok(None)` when the wait elapsed without a delivery. The delivered
    /// envelope stays invisible to other readers for `visibility_timeout` unless
    /// acknowledged.
    async fn receive(
        &self,
        queue_name: &str,
        wait: Duration,
        visibility_timeout: Duration,
    ) -> MessagingResult<Option<Delivery>>;

    /// Acknowledge deliveries, removing them from the queue
    async fn acknowledge(&self, queue_name: &str, receipts: &[ReceiptHandle])
        -> MessagingResult<()>;

    /// Number of envelopes currently stored in the queue, visible or not
    async fn queue_depth(&self, queue_name: &str) -> MessagingResult<u64>;

    /// Verify the backend is reachable
    async fn health_check(&self) -> MessagingResult<bool>;

    /// Provider name for logging (e.g. "pgmq", "in_memory")
    fn provider_name(&self) -> &'static str;
}

/// Validate a queue name against the strictest provider rules (pgmq)
pub fn validate_queue_name(queue_name: &str) -> MessagingResult<()> {
    if queue_name.is_empty() {
        return Err(MessagingError::invalid_queue_name(queue_name, "name is empty"));
    }
    if queue_name.len() > MAX_QUEUE_NAME_LENGTH {
        return Err(MessagingError::invalid_queue_name(
            queue_name,
            format!("name exceeds {MAX_QUEUE_NAME_LENGTH} characters"),
        ));
    }
    if queue_name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(MessagingError::invalid_queue_name(
            queue_name,
            "name must not start with a digit",
        ));
    }
    if !queue_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(MessagingError::invalid_queue_name(
            queue_name,
            "only ASCII letters, digits and underscores are allowed",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_name_validation() {
        assert!(validate_queue_name("points_in").is_ok());
        assert!(validate_queue_name("Clusters2").is_ok());

        assert!(validate_queue_name("").is_err());
        assert!(validate_queue_name("2fast").is_err());
        assert!(validate_queue_name("with-dash").is_err());
        assert!(validate_queue_name(&"q".repeat(MAX_QUEUE_NAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_ack_mode_serde() {
        let mode: AckMode = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(mode, AckMode::Auto);
        assert_eq!(AckMode::default(), AckMode::Explicit);
        assert_eq!(AckMode::Explicit.to_string(), "explicit");
    }

    #[test]
    fn test_receipt_from_message_id() {
        let receipt = ReceiptHandle::from(MessageId(42));
        assert_eq!(receipt.as_str(), "42");
    }
}
