//! # Pipeline Bootstrap
//!
//! Turns a validated [`PipelineConfig`] into a ready-to-start
//! [`AgentCoordinator`]: connect the broker, build each agent, bind a freshly
//! created processor from the registry and add the agent to the cohort. Any
//! configuration problem surfaces here, before a single task is spawned.

use std::sync::Arc;

use tracing::info;

use crate::agent::QueueAgent;
use crate::config::{AgentConfig, PipelineConfig};
use crate::coordinator::AgentCoordinator;
use crate::error::{PipelineError, Result};
use crate::messaging::{connect_messaging_service, MessagingService};
use crate::processors::ProcessorRegistry;

/// Connect the configured broker and build a coordinator for every agent
pub async fn build_coordinator(
    config: &PipelineConfig,
    registry: &ProcessorRegistry,
) -> Result<AgentCoordinator> {
    config.validate()?;
    let messaging = connect_messaging_service(&config.broker).await?;
    build_coordinator_with_service(config, registry, messaging)
}

/// Build a coordinator on an existing messaging service
pub fn build_coordinator_with_service(
    config: &PipelineConfig,
    registry: &ProcessorRegistry,
    messaging: Arc<dyn MessagingService>,
) -> Result<AgentCoordinator> {
    config.validate()?;

    let mut coordinator = AgentCoordinator::new();
    for agent_config in &config.agents {
        let agent = build_agent(agent_config, registry, messaging.clone())?;
        coordinator.add_agent(agent)?;
    }

    info!(
        agents = coordinator.agent_count(),
        provider = messaging.provider_name(),
        "🏗️ Pipeline bootstrapped"
    );
    Ok(coordinator)
}

/// Build and bind a single agent
pub fn build_agent(
    config: &AgentConfig,
    registry: &ProcessorRegistry,
    messaging: Arc<dyn MessagingService>,
) -> Result<QueueAgent> {
    let processor_name = config.processor.as_deref().ok_or_else(|| {
        PipelineError::configuration(format!("agent {} has no processor binding", config.name))
    })?;

    let mut agent = QueueAgent::new(config.clone()).with_messaging(messaging);
    agent.bind_processor(registry.create(processor_name)?)?;
    agent.validate()?;
    Ok(agent)
}
