//! # Outbox
//!
//! Write side of a queue agent. Outbound values are buffered as [`Message`]s and
//! transmitted as one envelope per flush, either automatically when the buffer
//! reaches `send_size` or explicitly through [`Outbox::flush`].
//!
//! `send` and `flush` share one async mutex, so an automatic flush triggered by
//! one caller never interleaves with another caller's append. The lock is held
//! across the broker call; the buffer is only cleared once the envelope was
//! accepted.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::status::AgentStatus;
use crate::constants::properties;
use crate::error::{PipelineError, Result};
use crate::messaging::{encode_envelope, Message, MessagingService};

/// Broker endpoint an outbox writes to
#[derive(Clone)]
pub struct WriteEndpoint {
    pub service: Arc<dyn MessagingService>,
    pub queue: String,
}

impl std::fmt::Debug for WriteEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteEndpoint")
            .field("provider", &self.service.provider_name())
            .field("queue", &self.queue)
            .finish()
    }
}

/// Buffered, type-homogeneous send path of one agent
#[derive(Debug)]
pub struct Outbox {
    agent: String,
    endpoint: Option<WriteEndpoint>,
    send_size: usize,
    buffer: Mutex<Vec<Message>>,
    status: Arc<AgentStatus>,
}

impl Outbox {
    pub fn new(
        agent: impl Into<String>,
        endpoint: Option<WriteEndpoint>,
        send_size: usize,
        status: Arc<AgentStatus>,
    ) -> Self {
        Self {
            agent: agent.into(),
            endpoint,
            send_size: send_size.max(1),
            buffer: Mutex::new(Vec::with_capacity(send_size.max(1))),
            status,
        }
    }

    pub fn has_endpoint(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn send_size(&self) -> usize {
        self.send_size
    }

    /// Number of messages waiting for the next flush
    pub async fn buffered(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// Buffer one application value
    ///
    /// Returns the number of messages flushed by this call: `send_size` when the
    /// append filled the buffer, otherwise 0. A value that serializes to JSON
    /// `null` (for example `None`) is skipped with a warning. A value that cannot
    /// be serialized fails as a processing error of this agent.
    pub async fn send<T: Serialize + ?Sized>(&self, value: &T) -> Result<usize> {
        self.require_endpoint()?;

        let message = Message::new(value)
            .map_err(|e| PipelineError::processing(self.agent.clone(), e.to_string()))?;
        if message.body().is_null() {
            warn!(
                agent = %self.agent,
                body_type = %message.body_type(),
                "Ignoring null value passed to send"
            );
            return Ok(0);
        }
        self.send_message(message).await
    }

    /// Buffer an already-built message
    ///
    /// The message keeps its own properties; `source_agent` is stamped only when
    /// the producer did not set it.
    pub async fn send_message(&self, mut message: Message) -> Result<usize> {
        let endpoint = self.require_endpoint()?;

        if message.property(properties::SOURCE_AGENT).is_none() {
            message.set_property(properties::SOURCE_AGENT, self.agent.clone());
        }

        let mut buffer = self.buffer.lock().await;
        if let Some(first) = buffer.first() {
            if first.body_type() != message.body_type() {
                return Err(PipelineError::MixedSendBuffer {
                    agent: self.agent.clone(),
                    expected: first.body_type().to_string(),
                    found: message.body_type().to_string(),
                });
            }
        }

        buffer.push(message);
        if buffer.len() >= self.send_size {
            return self.transmit(endpoint, &mut buffer).await;
        }
        Ok(0)
    }

    /// Transmit everything buffered as one envelope; an empty buffer sends nothing
    pub async fn flush(&self) -> Result<usize> {
        let endpoint = self.require_endpoint()?;
        let mut buffer = self.buffer.lock().await;
        self.transmit(endpoint, &mut buffer).await
    }

    fn require_endpoint(&self) -> Result<&WriteEndpoint> {
        self.endpoint.as_ref().ok_or_else(|| {
            PipelineError::configuration(format!(
                "agent {} has no write queue; send is not available",
                self.agent
            ))
        })
    }

    async fn transmit(&self, endpoint: &WriteEndpoint, buffer: &mut Vec<Message>) -> Result<usize> {
        if buffer.is_empty() {
            return Ok(0);
        }

        let started = Instant::now();
        let payload = encode_envelope(buffer)?;
        let message_id = endpoint
            .service
            .send_envelope(&endpoint.queue, payload)
            .await?;

        let count = buffer.len();
        buffer.clear();
        self.status.record_flush(count);

        debug!(
            agent = %self.agent,
            queue = %endpoint.queue,
            message_id = %message_id,
            count = count,
            duration_ms = started.elapsed().as_millis() as u64,
            "📤 Flushed send buffer"
        );
        Ok(count)
    }
}
