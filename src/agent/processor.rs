//! # Processing Units
//!
//! The pluggable logic an agent drives. A unit either consumes batches handed to
//! it by the agent's pump, or, on an agent without a read queue, produces output
//! on its own from a single `produce` call.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use super::outbox::Outbox;
use super::status::AgentStatus;
use crate::coordinator::ShutdownSignal;
use crate::error::Result;
use crate::messaging::Message;

/// User-supplied batch processing logic bound to exactly one agent
#[async_trait]
pub trait ProcessingUnit: Send + 'static {
    /// Name used in logs and in the processor registry
    fn name(&self) -> &str;

    /// Apply agent options; called once at bind time, before the agent starts
    fn configure(&mut self, _options: &HashMap<String, String>) -> Result<()> {
        Ok(())
    }

    /// Handle one batch, in broker delivery order
    ///
    /// An error fails the batch: it is dropped without acknowledgment and the
    /// agent moves on to the next receive.
    async fn consume(&mut self, batch: Vec<Message>, context: &AgentContext) -> anyhow::Result<()>;

    /// Drive output for an agent without a read queue
    ///
    /// Called exactly once; the agent finishes when this returns.
    async fn produce(&mut self, _context: &AgentContext) -> anyhow::Result<()> {
        anyhow::bail!("processor {} cannot run as a producer", self.name())
    }

    fn on_bind(&mut self, _agent: &str) {}

    fn on_unbind(&mut self, _agent: &str) {}
}

/// What a processing unit sees of its agent while running
#[derive(Debug, Clone)]
pub struct AgentContext {
    agent: Arc<str>,
    outbox: Arc<Outbox>,
    status: Arc<AgentStatus>,
    shutdown: ShutdownSignal,
}

impl AgentContext {
    pub(crate) fn new(
        agent: &str,
        outbox: Arc<Outbox>,
        status: Arc<AgentStatus>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            agent: Arc::from(agent),
            outbox,
            status,
            shutdown,
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent
    }

    pub fn can_send(&self) -> bool {
        self.outbox.has_endpoint()
    }

    /// See [`Outbox::send`]
    pub async fn send<T: Serialize + ?Sized + Sync>(&self, value: &T) -> Result<usize> {
        self.outbox.send(value).await
    }

    pub async fn send_message(&self, message: Message) -> Result<usize> {
        self.outbox.send_message(message).await
    }

    pub async fn flush(&self) -> Result<usize> {
        self.outbox.flush().await
    }

    pub fn status(&self) -> &AgentStatus {
        &self.status
    }

    /// Long-running producers should poll this and return once it is set
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.is_triggered()
    }

    pub async fn shutdown_requested(&self) {
        self.shutdown.wait().await
    }
}
