//! # Pipeline Agents
//!
//! Command-line runner for a configured pipeline: loads layered configuration,
//! builds every agent with the built-in processors and runs the cohort until all
//! agents stop. Ctrl-C asks the agents to drain and stop.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use pipeline_core::bootstrap::build_coordinator;
use pipeline_core::config::ConfigManager;
use pipeline_core::logging::init_structured_logging;
use pipeline_core::processors::ProcessorRegistry;
use pipeline_core::{AgentState, Result};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "pipeline-agents")]
#[command(about = "Run a pipeline of batching queue agents")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration directory (default: $PIPELINE_CONFIG_DIR or ./config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Environment overlay to apply (default: $PIPELINE_ENV, $APP_ENV or development)
    #[arg(short, long)]
    environment: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start every configured agent and wait for all of them to stop
    Run {
        /// Seconds to wait for agents to drain after Ctrl-C
        #[arg(long, default_value_t = 30)]
        grace_period_secs: u64,
    },

    /// Load and validate the configuration without starting anything
    Validate,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_structured_logging();

    let result = match &cli.command {
        Commands::Run { grace_period_secs } => {
            run_pipeline(&cli, Duration::from_secs(*grace_period_secs)).await
        }
        Commands::Validate => validate_config(&cli),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!(category = e.category(), "Pipeline failed: {}", e);
            process::exit(1);
        }
    }
}

fn load_config(cli: &Cli) -> Result<std::sync::Arc<ConfigManager>> {
    let environment = cli
        .environment
        .clone()
        .unwrap_or_else(ConfigManager::detect_environment);
    ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &environment)
}

fn validate_config(cli: &Cli) -> Result<i32> {
    println!("🔧 Validating pipeline configuration");
    let manager = load_config(cli)?;

    println!("Environment: {}", manager.environment());
    println!("Config Directory: {}", manager.config_directory().display());
    println!("Broker: {:?}", manager.config().broker.provider);

    let registry = ProcessorRegistry::with_builtins();
    let mut unknown = 0;
    for agent in &manager.config().agents {
        let processor = agent.processor.as_deref().unwrap_or_default();
        let known = registry.contains(processor);
        if !known {
            unknown += 1;
        }
        println!(
            "  {} {} (read: {}, write: {}, processor: {})",
            if known { "✅" } else { "❌" },
            agent.name,
            agent.read_queue.as_deref().unwrap_or("-"),
            agent.write_queue.as_deref().unwrap_or("-"),
            processor
        );
    }

    if unknown > 0 {
        println!("\n❌ {unknown} agents name an unknown processor");
        return Ok(1);
    }
    println!("\n🎉 Configuration is valid");
    Ok(0)
}

async fn run_pipeline(cli: &Cli, grace_period: Duration) -> Result<i32> {
    let manager = load_config(cli)?;
    let mut coordinator =
        build_coordinator(manager.config(), &ProcessorRegistry::with_builtins()).await?;
    coordinator.start()?;

    tokio::select! {
        result = coordinator.wait_for_completion() => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupt received; asking agents to drain");
            coordinator.shutdown();
            if !coordinator.wait_for_completion_timeout(grace_period).await? {
                error!("Agents did not stop within {:?}", grace_period);
                return Ok(1);
            }
        }
    }

    let report = coordinator.join().await?;
    for agent in &report.agents {
        match &agent.state {
            AgentState::Completed => info!(
                agent = %agent.name,
                received = agent.stats.messages_received,
                sent = agent.stats.messages_sent,
                failed_batches = agent.stats.batches_failed,
                "Agent completed"
            ),
            state => error!(agent = %agent.name, state = %state, "Agent did not complete"),
        }
    }

    Ok(if report.all_succeeded() { 0 } else { 1 })
}
