//! # Pipeline Configuration
//!
//! Typed configuration for the broker connection and every queue agent in the
//! pipeline. Values are loaded in layers by [`ConfigManager`] and validated before
//! any agent is built, so a misconfigured agent never joins the running cohort.
//!
//! ## Example
//!
//! ```toml
//! [broker]
//! provider = "in_memory"
//!
//! [[agents]]
//! name = "numbers"
//! write_queue = "numbers"
//! processor = "sequence"
//! options = { count = "100" }
//!
//! [[agents]]
//! name = "printer"
//! read_queue = "numbers"
//! processor = "log"
//! read_size = 10
//! receive_timeout_ms = 250
//! ```

pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

pub use loader::ConfigManager;

use crate::constants::{
    DEFAULT_MAX_CONNECTIONS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_READ_SIZE,
    DEFAULT_RECEIVE_TIMEOUT_MS, DEFAULT_SEND_SIZE, DEFAULT_VISIBILITY_TIMEOUT_SECONDS,
};
use crate::error::{PipelineError, Result};
use crate::messaging::{validate_queue_name, AckMode};

/// Root configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

impl PipelineConfig {
    /// Parse a TOML document without touching the filesystem or environment
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: PipelineConfig = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validate the broker section and every agent; agent names must be unique
    pub fn validate(&self) -> Result<()> {
        self.broker.validate()?;

        if self.agents.is_empty() {
            return Err(PipelineError::configuration("no agents configured"));
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            agent.validate()?;
            if !seen.insert(agent.name.as_str()) {
                return Err(PipelineError::configuration(format!(
                    "duplicate agent name: {}",
                    agent.name
                )));
            }
        }
        Ok(())
    }

    pub fn agent(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|agent| agent.name == name)
    }
}

/// Which messaging backend the pipeline runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerProvider {
    #[default]
    InMemory,
    Pgmq,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub provider: BrokerProvider,
    /// Postgres connection string; required for `pgmq`
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            provider: BrokerProvider::InMemory,
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.provider == BrokerProvider::Pgmq && self.database_url.is_none() {
            return Err(PipelineError::configuration(
                "broker.database_url is required for the pgmq provider",
            ));
        }
        if self.max_connections == 0 {
            return Err(PipelineError::configuration(
                "broker.max_connections must be at least 1",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(PipelineError::configuration(
                "broker.poll_interval_ms must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Settings for a single queue agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique agent name, used in logs and to match processor bindings
    pub name: String,
    #[serde(default)]
    pub read_queue: Option<String>,
    #[serde(default)]
    pub write_queue: Option<String>,
    /// Registered processor name bound to this agent
    #[serde(default)]
    pub processor: Option<String>,
    /// Options handed to the processor's `configure`
    #[serde(default)]
    pub options: HashMap<String, String>,
    /// Batch size that triggers a dispatch
    #[serde(default = "default_read_size")]
    pub read_size: usize,
    /// Buffered outbound messages that trigger an automatic flush
    #[serde(default = "default_send_size")]
    pub send_size: usize,
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
    #[serde(default = "default_visibility_timeout_seconds")]
    pub visibility_timeout_seconds: u64,
    #[serde(default)]
    pub ack_mode: AckMode,
    /// When set, inbound items with any other body type are a protocol error
    #[serde(default)]
    pub expected_body_type: Option<String>,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            read_queue: None,
            write_queue: None,
            processor: None,
            options: HashMap::new(),
            read_size: DEFAULT_READ_SIZE,
            send_size: DEFAULT_SEND_SIZE,
            receive_timeout_ms: DEFAULT_RECEIVE_TIMEOUT_MS,
            visibility_timeout_seconds: DEFAULT_VISIBILITY_TIMEOUT_SECONDS,
            ack_mode: AckMode::default(),
            expected_body_type: None,
        }
    }

    pub fn with_read_queue(mut self, queue: impl Into<String>) -> Self {
        self.read_queue = Some(queue.into());
        self
    }

    pub fn with_write_queue(mut self, queue: impl Into<String>) -> Self {
        self.write_queue = Some(queue.into());
        self
    }

    pub fn with_processor(mut self, processor: impl Into<String>) -> Self {
        self.processor = Some(processor.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_read_size(mut self, read_size: usize) -> Self {
        self.read_size = read_size;
        self
    }

    pub fn with_send_size(mut self, send_size: usize) -> Self {
        self.send_size = send_size;
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_ack_mode(mut self, ack_mode: AckMode) -> Self {
        self.ack_mode = ack_mode;
        self
    }

    pub fn with_expected_body_type(mut self, body_type: impl Into<String>) -> Self {
        self.expected_body_type = Some(body_type.into());
        self
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }

    /// Check the agent's own settings; the broker services it runs on are
    /// checked when the agent is built
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::configuration("agent name must not be empty"));
        }
        if self.read_queue.is_none() && self.write_queue.is_none() {
            return Err(PipelineError::configuration(format!(
                "agent {} needs a read_queue, a write_queue, or both",
                self.name
            )));
        }
        for queue in self.read_queue.iter().chain(self.write_queue.iter()) {
            validate_queue_name(queue).map_err(|e| {
                PipelineError::configuration(format!("agent {}: {e}", self.name))
            })?;
        }
        if self.processor.as_deref().map_or(true, |p| p.trim().is_empty()) {
            return Err(PipelineError::configuration(format!(
                "agent {} has no processor binding",
                self.name
            )));
        }
        if self.read_size == 0 {
            return Err(PipelineError::configuration(format!(
                "agent {}: read_size must be at least 1",
                self.name
            )));
        }
        if self.send_size == 0 {
            return Err(PipelineError::configuration(format!(
                "agent {}: send_size must be at least 1",
                self.name
            )));
        }
        if self.read_queue.is_some() && self.receive_timeout_ms == 0 {
            return Err(PipelineError::configuration(format!(
                "agent {}: receive_timeout_ms must be greater than zero",
                self.name
            )));
        }
        if self.read_queue.is_some() && self.visibility_timeout_seconds == 0 {
            return Err(PipelineError::configuration(format!(
                "agent {}: visibility_timeout_seconds must be greater than zero",
                self.name
            )));
        }
        Ok(())
    }
}

fn default_read_size() -> usize {
    DEFAULT_READ_SIZE
}

fn default_send_size() -> usize {
    DEFAULT_SEND_SIZE
}

fn default_receive_timeout_ms() -> u64 {
    DEFAULT_RECEIVE_TIMEOUT_MS
}

fn default_visibility_timeout_seconds() -> u64 {
    DEFAULT_VISIBILITY_TIMEOUT_SECONDS
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
