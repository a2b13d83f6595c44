#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Pipeline Agents Core
//!
//! Batching queue agents for stream-processing pipelines, plus the coordinator
//! that starts a cohort of agents in lockstep and waits for all of them to stop.
//!
//! ## Overview
//!
//! Each [`QueueAgent`] reads envelopes of typed messages from an input queue,
//! hands them to a pluggable [`ProcessingUnit`] in batches and buffers the unit's
//! output into envelopes for a downstream queue. An agent without an input queue
//! runs its unit as a pure producer.
//!
//! ## Module Organization
//!
//! - [`agent`] - Queue agent, batch pump, send buffer, processing unit trait
//! - [`coordinator`] - Start gate, completion latch, shutdown signal, cohort runner
//! - [`messaging`] - Message envelopes and broker providers (in-memory, pgmq)
//! - [`processors`] - Processor registry and built-in processors
//! - [`config`] - Layered configuration loading
//! - [`bootstrap`] - Building a coordinator from configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pipeline_core::bootstrap::build_coordinator;
//! use pipeline_core::config::PipelineConfig;
//! use pipeline_core::processors::ProcessorRegistry;
//!
//! # async fn example() -> pipeline_core::Result<()> {
//! let config = PipelineConfig::from_toml_str(r#"
//!     [[agents]]
//!     name = "numbers"
//!     write_queue = "numbers"
//!     processor = "sequence"
//!     options = { count = "100" }
//!
//!     [[agents]]
//!     name = "printer"
//!     read_queue = "numbers"
//!     processor = "log"
//! "#)?;
//!
//! let coordinator = build_coordinator(&config, &ProcessorRegistry::with_builtins()).await?;
//! let report = coordinator.run().await?;
//! assert!(report.all_succeeded());
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod processors;

pub use agent::{AgentContext, AgentState, AgentStatus, ProcessingUnit, QueueAgent};
pub use config::{AgentConfig, ConfigManager, PipelineConfig};
pub use coordinator::{AgentCoordinator, CohortReport, ShutdownSignal};
pub use error::{PipelineError, Result};
pub use messaging::{AckMode, Message, MessagingService};
pub use processors::ProcessorRegistry;
