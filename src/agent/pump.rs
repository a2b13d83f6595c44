//! # Batch Pump
//!
//! Read side of a queue agent. The pump receives envelopes from the read queue,
//! accumulates their messages into a batch and dispatches the batch to the
//! processing unit when it is full or when a receive times out with messages
//! waiting. In explicit ack mode deliveries are acknowledged only after the batch
//! containing them was consumed successfully.

use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use super::processor::{AgentContext, ProcessingUnit};
use super::status::{AgentState, AgentStatus};
use crate::config::AgentConfig;
use crate::coordinator::ShutdownSignal;
use crate::error::{PipelineError, Result};
use crate::logging::{log_batch_dispatch, log_error};
use crate::messaging::{decode_envelope, AckMode, Delivery, Message, MessagingService, ReceiptHandle};

/// Why a batch was handed to the processing unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchTrigger {
    /// The batch reached `read_size`
    FullBatch,
    /// A receive timed out with a partial batch waiting
    Idle,
    /// Shutdown was requested with a partial batch waiting
    Shutdown,
}

impl DispatchTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchTrigger::FullBatch => "full_batch",
            DispatchTrigger::Idle => "idle",
            DispatchTrigger::Shutdown => "shutdown",
        }
    }
}

pub(crate) struct BatchPump {
    agent: String,
    reader: Arc<dyn MessagingService>,
    queue: String,
    read_size: usize,
    receive_timeout: Duration,
    visibility_timeout: Duration,
    ack_mode: AckMode,
    expected_body_type: Option<String>,
    status: Arc<AgentStatus>,
    batch: Vec<Message>,
    unacked: Vec<ReceiptHandle>,
}

impl BatchPump {
    pub(crate) fn new(
        config: &AgentConfig,
        reader: Arc<dyn MessagingService>,
        queue: String,
        status: Arc<AgentStatus>,
    ) -> Self {
        Self {
            agent: config.name.clone(),
            reader,
            queue,
            read_size: config.read_size.max(1),
            receive_timeout: config.receive_timeout(),
            visibility_timeout: config.visibility_timeout(),
            ack_mode: config.ack_mode,
            expected_body_type: config.expected_body_type.clone(),
            status,
            batch: Vec::with_capacity(config.read_size.max(1)),
            unacked: Vec::new(),
        }
    }

    /// Pump until shutdown or a fatal error
    ///
    /// On shutdown the partial batch is dispatched before returning. Broker and
    /// framing errors end the loop; a failed batch does not.
    pub(crate) async fn run(
        &mut self,
        processor: &mut dyn ProcessingUnit,
        context: &AgentContext,
        shutdown: &ShutdownSignal,
    ) -> Result<()> {
        info!(
            agent = %self.agent,
            queue = %self.queue,
            read_size = self.read_size,
            receive_timeout_ms = self.receive_timeout.as_millis() as u64,
            ack_mode = %self.ack_mode,
            "🔄 AGENT: Starting batch pump"
        );

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.wait() => None,
                result = self.reader.receive(&self.queue, self.receive_timeout, self.visibility_timeout) => Some(result),
            };

            match received {
                None => {
                    self.status.set_state(AgentState::Draining);
                    if !self.batch.is_empty() {
                        self.dispatch(processor, context, DispatchTrigger::Shutdown)
                            .await?;
                    }
                    info!(agent = %self.agent, "🛑 AGENT: Batch pump stopped on shutdown request");
                    return Ok(());
                }
                Some(Ok(Some(delivery))) => {
                    self.accept(delivery).await?;
                    if self.batch.len() >= self.read_size {
                        self.dispatch(processor, context, DispatchTrigger::FullBatch)
                            .await?;
                    }
                }
                Some(Ok(None)) => {
                    if !self.batch.is_empty() {
                        self.dispatch(processor, context, DispatchTrigger::Idle)
                            .await?;
                    }
                }
                Some(Err(e)) => {
                    error!(agent = %self.agent, queue = %self.queue, error = %e, "Receive failed");
                    return Err(e.into());
                }
            }
        }
    }

    /// Validate an envelope and append its messages to the batch
    async fn accept(&mut self, delivery: Delivery) -> Result<()> {
        let messages = decode_envelope(delivery.payload, self.expected_body_type.as_deref())
            .map_err(|e| PipelineError::protocol(&self.agent, e.to_string()))?;

        self.status.record_envelope(messages.len());
        debug!(
            agent = %self.agent,
            receipt = %delivery.receipt,
            receive_count = delivery.receive_count,
            messages = messages.len(),
            "📥 Received envelope"
        );

        // Nothing in an empty envelope can fail, so it is consumed right away
        if self.ack_mode == AckMode::Auto || messages.is_empty() {
            self.reader
                .acknowledge(&self.queue, &[delivery.receipt])
                .await?;
        } else {
            self.unacked.push(delivery.receipt);
        }

        self.batch.extend(messages);
        Ok(())
    }

    async fn dispatch(
        &mut self,
        processor: &mut dyn ProcessingUnit,
        context: &AgentContext,
        trigger: DispatchTrigger,
    ) -> Result<()> {
        let batch = mem::take(&mut self.batch);
        let receipts = mem::take(&mut self.unacked);
        let batch_size = batch.len();

        let started = Instant::now();
        let outcome = processor.consume(batch, context).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        self.status.record_dispatch(outcome.is_ok());
        log_batch_dispatch(
            &self.agent,
            batch_size,
            trigger.as_str(),
            duration_ms,
            outcome.is_ok(),
        );

        match outcome {
            Ok(()) => {
                if !receipts.is_empty() {
                    self.reader.acknowledge(&self.queue, &receipts).await?;
                }
                Ok(())
            }
            Err(e) => match e.downcast::<PipelineError>() {
                // Errors the unit passed through from the agent itself, such as a
                // broker failure during send, still end the pump
                Ok(fatal) if fatal.is_fatal() => {
                    log_error(&self.agent, "consume", &fatal.to_string(), Some(processor.name()));
                    Err(fatal)
                }
                Ok(contained) => {
                    self.log_failed_batch(processor.name(), batch_size, receipts.len(), &contained.to_string());
                    Ok(())
                }
                Err(other) => {
                    self.log_failed_batch(processor.name(), batch_size, receipts.len(), &format!("{other:#}"));
                    Ok(())
                }
            },
        }
    }

    fn log_failed_batch(&self, processor: &str, batch_size: usize, unacknowledged: usize, error: &str) {
        error!(
            agent = %self.agent,
            processor = %processor,
            batch_size = batch_size,
            unacknowledged = unacknowledged,
            error = %error,
            "Batch failed; dropping it without acknowledgment"
        );
    }
}
