//! # Agent Coordinator
//!
//! Starts a cohort of queue agents in lockstep and waits for all of them to stop.
//!
//! Every agent gets its own tokio task. Each task blocks on a shared
//! [`StartGate`] before any broker I/O, and the gate is opened once, after the
//! last task was spawned. Each task holds a [`CompletionGuard`] on a shared
//! [`CompletionLatch`] sized to the cohort; waiting for completion waits for the
//! latch to reach zero.
//!
//! The latch does not say whether an agent succeeded. Per-agent outcomes are
//! available from [`AgentCoordinator::statuses`] while running and from the
//! [`CohortReport`] returned by [`AgentCoordinator::join`].

pub mod signals;

pub use signals::{CompletionGuard, CompletionLatch, ShutdownSignal, StartGate};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agent::{AgentState, AgentStats, AgentStatus, QueueAgent};
use crate::error::{PipelineError, Result};

/// Final state of one agent after the cohort finished
#[derive(Debug, Clone, Serialize)]
pub struct AgentReport {
    pub name: String,
    pub state: AgentState,
    pub stats: AgentStats,
}

/// Outcome of a cohort run
#[derive(Debug, Clone, Serialize)]
pub struct CohortReport {
    pub cohort_id: Uuid,
    pub agents: Vec<AgentReport>,
}

impl CohortReport {
    pub fn all_succeeded(&self) -> bool {
        self.agents
            .iter()
            .all(|agent| agent.state == AgentState::Completed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &AgentReport> {
        self.agents
            .iter()
            .filter(|agent| matches!(agent.state, AgentState::Failed { .. }))
    }
}

/// Launches agents behind a shared start gate and tracks their completion
#[derive(Debug)]
pub struct AgentCoordinator {
    cohort_id: Uuid,
    pending: Vec<QueueAgent>,
    statuses: Vec<Arc<AgentStatus>>,
    names: HashSet<String>,
    gate: StartGate,
    shutdown: ShutdownSignal,
    latch: Option<CompletionLatch>,
    handles: Vec<(String, JoinHandle<Result<()>>)>,
}

impl Default for AgentCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentCoordinator {
    pub fn new() -> Self {
        Self {
            cohort_id: Uuid::new_v4(),
            pending: Vec::new(),
            statuses: Vec::new(),
            names: HashSet::new(),
            gate: StartGate::new(),
            shutdown: ShutdownSignal::new(),
            latch: None,
            handles: Vec::new(),
        }
    }

    /// Identifies this cohort in logs and reports
    pub fn cohort_id(&self) -> Uuid {
        self.cohort_id
    }

    /// Build a coordinator for a complete set of agents
    pub fn with_agents(agents: impl IntoIterator<Item = QueueAgent>) -> Result<Self> {
        let mut coordinator = Self::new();
        for agent in agents {
            coordinator.add_agent(agent)?;
        }
        Ok(coordinator)
    }

    /// Add an agent to the cohort
    ///
    /// The agent is validated here; an invalid agent never joins the cohort.
    pub fn add_agent(&mut self, agent: QueueAgent) -> Result<()> {
        if self.is_started() {
            return Err(PipelineError::InvalidState(format!(
                "cannot add agent {} after the cohort started",
                agent.name()
            )));
        }
        agent.validate()?;
        if !self.names.insert(agent.name().to_string()) {
            return Err(PipelineError::configuration(format!(
                "duplicate agent name: {}",
                agent.name()
            )));
        }

        self.statuses.push(agent.status());
        self.pending.push(agent);
        Ok(())
    }

    pub fn agent_count(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_started(&self) -> bool {
        self.latch.is_some()
    }

    /// Status handles of every agent, in the order they were added
    pub fn statuses(&self) -> &[Arc<AgentStatus>] {
        &self.statuses
    }

    /// The gate agents wait on; opened by [`start`](Self::start)
    pub fn start_gate(&self) -> StartGate {
        self.gate.clone()
    }

    /// Signal that asks every agent to drain and stop
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        if self.shutdown.trigger() {
            info!("🛑 COORDINATOR: Shutdown requested for {} agents", self.agent_count());
        }
    }

    /// Spawn one task per agent, then open the start gate
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.is_started() {
            return Err(PipelineError::InvalidState(
                "agent cohort already started".to_string(),
            ));
        }

        let agents = std::mem::take(&mut self.pending);
        let latch = CompletionLatch::new(agents.len());
        if agents.is_empty() {
            warn!("COORDINATOR: Starting an empty agent cohort");
        }

        info!(
            cohort_id = %self.cohort_id,
            "🚀 COORDINATOR: Launching {} agents",
            agents.len()
        );
        for agent in agents {
            let name = agent.name().to_string();
            let task = agent.run(self.gate.clone(), latch.guard(), self.shutdown.clone());
            self.handles.push((name, tokio::spawn(task)));
        }
        self.latch = Some(latch);

        self.gate.open();
        info!("✅ COORDINATOR: Start gate opened");
        Ok(())
    }

    fn latch(&self) -> Result<&CompletionLatch> {
        self.latch.as_ref().ok_or_else(|| {
            PipelineError::InvalidState("agent cohort has not been started".to_string())
        })
    }

    /// Agents that have not signaled completion yet
    pub fn remaining(&self) -> usize {
        self.latch.as_ref().map_or(self.pending.len(), CompletionLatch::remaining)
    }

    /// Block until every agent signaled completion
    pub async fn wait_for_completion(&self) -> Result<()> {
        self.latch()?.wait().await;
        info!(cohort_id = %self.cohort_id, "🎉 COORDINATOR: All agents completed");
        Ok(())
    }

    /// Like [`wait_for_completion`](Self::wait_for_completion) with an upper
    /// bound; returns whether every agent completed in time
    pub async fn wait_for_completion_timeout(&self, timeout: Duration) -> Result<bool> {
        let completed = self.latch()?.wait_timeout(timeout).await;
        if !completed {
            warn!(
                "COORDINATOR: {} agents still running after {:?}",
                self.remaining(),
                timeout
            );
        }
        Ok(completed)
    }

    /// Collect every agent's outcome; waits for all tasks to finish
    pub async fn join(mut self) -> Result<CohortReport> {
        self.latch()?;

        let (names, handles): (Vec<String>, Vec<_>) = self.handles.drain(..).unzip();
        let outcomes = join_all(handles).await;

        let mut report = CohortReport {
            cohort_id: self.cohort_id,
            agents: Vec::with_capacity(names.len()),
        };
        for ((name, outcome), status) in names.into_iter().zip(outcomes).zip(&self.statuses) {
            if let Err(join_error) = outcome {
                error!("❌ COORDINATOR: Agent {} task aborted: {}", name, join_error);
                status.set_state(AgentState::Failed {
                    reason: format!("task aborted: {join_error}"),
                });
            }
            report.agents.push(AgentReport {
                name,
                state: status.state(),
                stats: status.stats(),
            });
        }

        let failed = report.failed().count();
        if failed > 0 {
            warn!("COORDINATOR: {} of {} agents failed", failed, report.agents.len());
        }
        Ok(report)
    }

    /// Start the cohort, wait for every agent, and report
    pub async fn run(mut self) -> Result<CohortReport> {
        self.start()?;
        self.wait_for_completion().await?;
        self.join().await
    }
}
