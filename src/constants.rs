//! # System Constants
//!
//! Defaults applied when an agent configuration leaves a value unset, plus the
//! well-known property keys stamped on messages.

/// Maximum number of messages accumulated before a batch is dispatched
pub const DEFAULT_READ_SIZE: usize = 20;

/// Maximum number of outbound messages buffered before an automatic flush
pub const DEFAULT_SEND_SIZE: usize = 20;

/// How long a single receive blocks before reporting a timeout
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 1000;

/// How long a delivered but unacknowledged envelope stays invisible to other readers
pub const DEFAULT_VISIBILITY_TIMEOUT_SECONDS: u64 = 30;

/// Poll interval used by brokers that have no server-side blocking read
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Connection pool size for the pgmq provider
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// pgmq prefixes queue tables with `q_`/`a_`, which bounds usable queue names
pub const MAX_QUEUE_NAME_LENGTH: usize = 47;

/// Property keys the framework sets on messages
pub mod properties {
    /// Name of the agent that enqueued the message, unless the producer set it
    pub const SOURCE_AGENT: &str = "source_agent";
}
