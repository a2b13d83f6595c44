//! # Processor Registry
//!
//! Maps processor names used in agent configuration to factories that build
//! fresh [`ProcessingUnit`]s. Every agent gets its own instance.
//!
//! Built-in processors are generic plumbing:
//!
//! - **forward**: re-send every consumed message downstream
//! - **sequence**: producer emitting a run of integers
//! - **log**: terminal consumer that logs what it receives

pub mod forward;
pub mod log;
pub mod sequence;

pub use forward::ForwardProcessor;
pub use log::LogProcessor;
pub use sequence::SequenceProcessor;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::agent::ProcessingUnit;
use crate::error::{PipelineError, Result};

/// Builds a new processing unit
pub type ProcessorFactory = Arc<dyn Fn() -> Box<dyn ProcessingUnit> + Send + Sync>;

/// Name-to-factory lookup for processing units
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    factories: HashMap<String, ProcessorFactory>,
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("processors", &self.names())
            .finish()
    }
}

impl ProcessorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `forward`, `sequence` and `log`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(forward::NAME, || Box::new(ForwardProcessor::default()));
        registry.register(sequence::NAME, || Box::new(SequenceProcessor::default()));
        registry.register(log::NAME, || Box::new(LogProcessor::default()));
        registry
    }

    /// Register a factory; replaces any factory already registered under `name`
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn ProcessingUnit> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build a new, unconfigured processing unit
    pub fn create(&self, name: &str) -> Result<Box<dyn ProcessingUnit>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            PipelineError::configuration(format!(
                "unknown processor '{name}' (registered: {})",
                self.names().join(", ")
            ))
        })?;
        Ok(factory())
    }
}

/// Parse an option value, naming the option in the error
pub(crate) fn parse_option<T>(
    processor: &str,
    options: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    options
        .get(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| {
                PipelineError::configuration(format!(
                    "processor {processor}: invalid value '{raw}' for option {key}: {e}"
                ))
            })
        })
        .transpose()
}
