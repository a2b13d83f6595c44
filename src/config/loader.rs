//! Configuration Loader
//!
//! Environment-aware layered loading built on the `config` crate:
//!
//! 1. `<dir>/pipeline.toml` (required)
//! 2. `<dir>/pipeline.<environment>.toml` (optional override)
//! 3. `PIPELINE__<SECTION>__<KEY>` environment variables
//!    (e.g. `PIPELINE__BROKER__DATABASE_URL`)

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::PipelineConfig;
use crate::error::{PipelineError, Result};

const BASE_FILE: &str = "pipeline.toml";
const ENV_PREFIX: &str = "PIPELINE";

/// Loaded, validated pipeline configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: PipelineConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration from the default directory with environment auto-detection
    pub fn load() -> Result<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> Result<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    ///
    /// Useful for tests that should not depend on process environment variables
    /// for environment selection.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> Result<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_layers(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            provider = ?config.broker.provider,
            agents = config.agents.len(),
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect the environment from `PIPELINE_ENV`, then `APP_ENV`
    pub fn detect_environment() -> String {
        env::var("PIPELINE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("PIPELINE_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn load_layers(config_directory: &Path, environment: &str) -> Result<PipelineConfig> {
        let base_path = config_directory.join(BASE_FILE);
        if !base_path.is_file() {
            return Err(PipelineError::configuration(format!(
                "configuration file not found: {}",
                base_path.display()
            )));
        }
        let env_path = config_directory.join(format!("pipeline.{environment}.toml"));

        let config: PipelineConfig = config::Config::builder()
            .add_source(config::File::from(base_path).required(true))
            .add_source(config::File::from(env_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }
}
