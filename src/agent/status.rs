//! # Agent Status
//!
//! Per-agent lifecycle state and counters. The coordinator's completion latch only
//! says that an agent stopped; callers that need to know why read this status.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;

/// Lifecycle of a queue agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum AgentState {
    /// Built but not yet started
    Created,
    /// Task spawned, blocked on the start gate
    WaitingForStart,
    Running,
    /// Shutdown requested; dispatching what is left and flushing output
    Draining,
    Completed,
    Failed { reason: String },
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Completed | AgentState::Failed { .. })
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentState::Created => f.write_str("created"),
            AgentState::WaitingForStart => f.write_str("waiting_for_start"),
            AgentState::Running => f.write_str("running"),
            AgentState::Draining => f.write_str("draining"),
            AgentState::Completed => f.write_str("completed"),
            AgentState::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Point-in-time copy of an agent's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AgentStats {
    pub envelopes_received: u64,
    pub messages_received: u64,
    pub batches_dispatched: u64,
    pub batches_failed: u64,
    pub messages_sent: u64,
    pub flushes: u64,
}

/// Shared, observable status of one agent
#[derive(Debug)]
pub struct AgentStatus {
    name: String,
    state: RwLock<AgentState>,
    envelopes_received: AtomicU64,
    messages_received: AtomicU64,
    batches_dispatched: AtomicU64,
    batches_failed: AtomicU64,
    messages_sent: AtomicU64,
    flushes: AtomicU64,
}

impl AgentStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(AgentState::Created),
            envelopes_received: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            batches_dispatched: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> AgentState {
        self.state.read().clone()
    }

    pub(crate) fn set_state(&self, state: AgentState) {
        *self.state.write() = state;
    }

    pub(crate) fn record_envelope(&self, message_count: usize) {
        self.envelopes_received.fetch_add(1, Ordering::Relaxed);
        self.messages_received
            .fetch_add(message_count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch(&self, succeeded: bool) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.batches_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_flush(&self, message_count: usize) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.messages_sent
            .fetch_add(message_count as u64, Ordering::Relaxed);
    }

    pub fn stats(&self) -> AgentStats {
        AgentStats {
            envelopes_received: self.envelopes_received.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }
}
