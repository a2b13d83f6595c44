//! # Cohort Synchronization Primitives
//!
//! Cross-task signals used by the coordinator and its agents. All three are built
//! on `tokio::sync::watch`, which keeps the latest state: a task that starts
//! waiting after the gate opened, after the latch reached zero, or after shutdown
//! was requested observes it immediately instead of missing a notification.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// One-shot gate that releases every waiting agent at once
#[derive(Debug, Clone)]
pub struct StartGate {
    open: Arc<watch::Sender<bool>>,
}

impl Default for StartGate {
    fn default() -> Self {
        Self::new()
    }
}

impl StartGate {
    /// Create a closed gate
    pub fn new() -> Self {
        let (open, _) = watch::channel(false);
        Self {
            open: Arc::new(open),
        }
    }

    /// Open the gate; returns `false` if it was already open
    pub fn open(&self) -> bool {
        self.open.send_if_modified(|open| {
            if *open {
                false
            } else {
                *open = true;
                true
            }
        })
    }

    pub fn is_open(&self) -> bool {
        *self.open.borrow()
    }

    /// Wait until the gate is open
    pub async fn wait(&self) {
        let mut receiver = self.open.subscribe();
        // The sender lives as long as `self`, so the wait cannot fail
        let _ = receiver.wait_for(|open| *open).await;
    }
}

/// Countdown shared by all agents of a cohort
#[derive(Debug, Clone)]
pub struct CompletionLatch {
    remaining: Arc<watch::Sender<usize>>,
}

impl CompletionLatch {
    pub fn new(count: usize) -> Self {
        let (remaining, _) = watch::channel(count);
        Self {
            remaining: Arc::new(remaining),
        }
    }

    /// Hand out a guard that counts the latch down exactly once
    pub fn guard(&self) -> CompletionGuard {
        CompletionGuard {
            latch: Some(self.clone()),
        }
    }

    pub fn remaining(&self) -> usize {
        *self.remaining.borrow()
    }

    fn count_down(&self) {
        self.remaining.send_modify(|remaining| {
            *remaining = remaining.saturating_sub(1);
        });
    }

    /// Wait until every guard has been released
    pub async fn wait(&self) {
        let mut receiver = self.remaining.subscribe();
        let _ = receiver.wait_for(|remaining| *remaining == 0).await;
    }

    /// Wait with an upper bound; returns whether the latch reached zero
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }
}

/// Completion token held by one agent task
///
/// Counts the latch down when released explicitly or when dropped, so an agent
/// that panics still signals completion.
#[derive(Debug)]
pub struct CompletionGuard {
    latch: Option<CompletionLatch>,
}

impl CompletionGuard {
    /// Signal completion now
    pub fn complete(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(latch) = self.latch.take() {
            latch.count_down();
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Cooperative shutdown request observed by pump loops and producers
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    requested: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (requested, _) = watch::channel(false);
        Self {
            requested: Arc::new(requested),
        }
    }

    /// Request shutdown; returns `false` if it was already requested
    pub fn trigger(&self) -> bool {
        self.requested.send_if_modified(|requested| {
            if *requested {
                false
            } else {
                *requested = true;
                true
            }
        })
    }

    pub fn is_triggered(&self) -> bool {
        *self.requested.borrow()
    }

    /// Resolve once shutdown has been requested
    pub async fn wait(&self) {
        let mut receiver = self.requested.subscribe();
        let _ = receiver.wait_for(|requested| *requested).await;
    }
}
