//! # Pipeline Error Types
//!
//! Crate-level error taxonomy. Configuration errors stop an agent before it joins
//! the cohort; protocol and messaging errors end a single agent's run; processing
//! failures drop the current batch and leave the agent running.

use thiserror::Error;

use crate::messaging::MessagingError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Protocol error in agent {agent}: {message}")]
    Protocol { agent: String, message: String },

    #[error("Processing unit failed in agent {agent}: {message}")]
    Processing { agent: String, message: String },

    #[error("Send buffer of agent {agent} holds {expected} values, refusing {found}")]
    MixedSendBuffer {
        agent: String,
        expected: String,
        found: String,
    },

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl PipelineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn protocol(agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            agent: agent.into(),
            message: message.into(),
        }
    }

    pub fn processing(agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Processing {
            agent: agent.into(),
            message: message.into(),
        }
    }

    /// Whether the error ends the agent's pump loop.
    ///
    /// Processing failures, including application values that do not serialize,
    /// are contained to the batch that caused them. Everything else means the agent
    /// can no longer make progress.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PipelineError::Processing { .. }
                | PipelineError::MixedSendBuffer { .. }
                | PipelineError::Serialization(_)
        )
    }

    /// Short category name used in structured log fields
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::Configuration(_) => "configuration",
            PipelineError::Protocol { .. } => "protocol",
            PipelineError::Processing { .. } => "processing",
            PipelineError::MixedSendBuffer { .. } => "send_buffer",
            PipelineError::Messaging(_) => "messaging",
            PipelineError::Serialization(_) => "serialization",
            PipelineError::InvalidState(_) => "invalid_state",
        }
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
