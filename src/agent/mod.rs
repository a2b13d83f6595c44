//! # Queue Agents
//!
//! A [`QueueAgent`] owns an optional read endpoint, an optional write endpoint and
//! one bound [`ProcessingUnit`]. With a read endpoint it runs the batch pump; with
//! only a write endpoint it calls the unit's `produce` once. Either way it blocks
//! on the cohort start gate before any broker I/O and releases its completion
//! guard exactly once when it stops.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pipeline_core::agent::QueueAgent;
//! use pipeline_core::config::AgentConfig;
//! use pipeline_core::messaging::{InMemoryMessagingService, MessagingService};
//! use pipeline_core::processors::LogProcessor;
//!
//! # fn example() -> pipeline_core::Result<()> {
//! let broker: Arc<dyn MessagingService> = Arc::new(InMemoryMessagingService::new());
//! let mut agent = QueueAgent::new(
//!     AgentConfig::new("printer").with_read_queue("numbers").with_read_size(10),
//! )
//! .with_reader(broker);
//! agent.bind_processor(Box::new(LogProcessor::default()))?;
//! agent.validate()?;
//! # Ok(())
//! # }
//! ```

pub mod outbox;
pub mod processor;
pub mod pump;
pub mod status;

pub use outbox::{Outbox, WriteEndpoint};
pub use processor::{AgentContext, ProcessingUnit};
pub use pump::DispatchTrigger;
pub use status::{AgentState, AgentStats, AgentStatus};

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::coordinator::{CompletionGuard, ShutdownSignal, StartGate};
use crate::error::{PipelineError, Result};
use crate::logging::{log_agent_operation, log_error};
use crate::messaging::MessagingService;
use pump::BatchPump;

/// One independently running stage of a pipeline
pub struct QueueAgent {
    config: AgentConfig,
    reader: Option<Arc<dyn MessagingService>>,
    writer: Option<Arc<dyn MessagingService>>,
    processor: Option<Box<dyn ProcessingUnit>>,
    status: Arc<AgentStatus>,
}

impl fmt::Debug for QueueAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueAgent")
            .field("name", &self.config.name)
            .field("read_queue", &self.config.read_queue)
            .field("write_queue", &self.config.write_queue)
            .field("processor", &self.processor.as_ref().map(|p| p.name().to_string()))
            .field("state", &self.status.state())
            .finish()
    }
}

impl QueueAgent {
    pub fn new(config: AgentConfig) -> Self {
        let status = Arc::new(AgentStatus::new(config.name.clone()));
        Self {
            config,
            reader: None,
            writer: None,
            processor: None,
            status,
        }
    }

    /// Use `service` for the configured read queue
    pub fn with_reader(mut self, service: Arc<dyn MessagingService>) -> Self {
        self.reader = Some(service);
        self
    }

    /// Use `service` for the configured write queue
    pub fn with_writer(mut self, service: Arc<dyn MessagingService>) -> Self {
        self.writer = Some(service);
        self
    }

    /// Use one service for whichever endpoints the config names
    pub fn with_messaging(mut self, service: Arc<dyn MessagingService>) -> Self {
        if self.config.read_queue.is_some() {
            self.reader = Some(service.clone());
        }
        if self.config.write_queue.is_some() {
            self.writer = Some(service);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Shared status handle; stays valid after the agent is moved into its task
    pub fn status(&self) -> Arc<AgentStatus> {
        self.status.clone()
    }

    pub fn is_producer(&self) -> bool {
        self.config.read_queue.is_none()
    }

    /// Configure `processor` with the agent's options and bind it
    ///
    /// An agent holds at most one processing unit; unbind the current one first.
    pub fn bind_processor(&mut self, mut processor: Box<dyn ProcessingUnit>) -> Result<()> {
        if let Some(current) = &self.processor {
            return Err(PipelineError::InvalidState(format!(
                "agent {} is already bound to processor {}",
                self.config.name,
                current.name()
            )));
        }

        processor.configure(&self.config.options)?;
        processor.on_bind(&self.config.name);
        if self.config.processor.is_none() {
            self.config.processor = Some(processor.name().to_string());
        }

        log_agent_operation(
            "bind_processor",
            &self.config.name,
            None,
            "bound",
            Some(processor.name()),
        );
        self.processor = Some(processor);
        Ok(())
    }

    pub fn unbind_processor(&mut self) -> Option<Box<dyn ProcessingUnit>> {
        let mut processor = self.processor.take()?;
        processor.on_unbind(&self.config.name);
        Some(processor)
    }

    /// Check everything needed to run, before any task is spawned
    pub fn validate(&self) -> Result<()> {
        self.config.validate()?;

        if self.processor.is_none() {
            return Err(PipelineError::configuration(format!(
                "agent {} has no bound processor",
                self.config.name
            )));
        }
        if self.config.read_queue.is_some() && self.reader.is_none() {
            return Err(PipelineError::configuration(format!(
                "agent {} names a read queue but has no reader service",
                self.config.name
            )));
        }
        if self.config.write_queue.is_some() && self.writer.is_none() {
            return Err(PipelineError::configuration(format!(
                "agent {} names a write queue but has no writer service",
                self.config.name
            )));
        }
        Ok(())
    }

    /// Run the agent to completion
    ///
    /// Waits for `gate` before touching the broker. The completion guard is
    /// released when this returns, whatever the outcome, and also if the task
    /// unwinds.
    pub async fn run(
        self,
        gate: StartGate,
        guard: CompletionGuard,
        shutdown: ShutdownSignal,
    ) -> Result<()> {
        let status = self.status.clone();
        let name = self.config.name.clone();

        status.set_state(AgentState::WaitingForStart);
        gate.wait().await;
        status.set_state(AgentState::Running);

        let outcome = self.run_started(&shutdown).await;
        match &outcome {
            Ok(()) => {
                status.set_state(AgentState::Completed);
                log_agent_operation("run", &name, None, "completed", None);
            }
            Err(e) => {
                status.set_state(AgentState::Failed {
                    reason: e.to_string(),
                });
                log_error(&name, "run", &e.to_string(), Some(e.category()));
            }
        }

        guard.complete();
        outcome
    }

    async fn run_started(self, shutdown: &ShutdownSignal) -> Result<()> {
        let QueueAgent {
            config,
            reader,
            writer,
            processor,
            status,
        } = self;

        let mut processor = processor.ok_or_else(|| {
            PipelineError::configuration(format!("agent {} has no bound processor", config.name))
        })?;

        let endpoint = match (&config.write_queue, writer) {
            (Some(queue), Some(service)) => {
                service.ensure_queue(queue).await?;
                Some(WriteEndpoint {
                    service,
                    queue: queue.clone(),
                })
            }
            _ => None,
        };
        let outbox = Arc::new(Outbox::new(
            config.name.clone(),
            endpoint,
            config.send_size,
            status.clone(),
        ));
        let context = AgentContext::new(&config.name, outbox.clone(), status.clone(), shutdown.clone());

        let result = match (&config.read_queue, reader) {
            (Some(queue), Some(service)) => {
                service.ensure_queue(queue).await?;
                log_agent_operation("pump", &config.name, Some(queue), "started", Some(processor.name()));
                let mut pump = BatchPump::new(&config, service, queue.clone(), status.clone());
                pump.run(processor.as_mut(), &context, shutdown).await
            }
            _ => {
                log_agent_operation(
                    "produce",
                    &config.name,
                    config.write_queue.as_deref(),
                    "started",
                    Some(processor.name()),
                );
                processor.produce(&context).await.map_err(|e| {
                    e.downcast::<PipelineError>()
                        .unwrap_or_else(|other| PipelineError::processing(&config.name, format!("{other:#}")))
                })
            }
        };

        // Whatever the unit left buffered goes out before the agent stops
        if outbox.has_endpoint() {
            match outbox.flush().await {
                Ok(0) => {}
                Ok(count) => info!(agent = %config.name, count = count, "📤 AGENT: Flushed remaining output"),
                Err(e) if result.is_ok() => return Err(e),
                Err(e) => warn!(agent = %config.name, error = %e, "AGENT: Final flush failed"),
            }
        }

        processor.on_unbind(&config.name);
        result
    }
}
