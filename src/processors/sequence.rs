//! Producer that emits the integers `start..start + count`.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::info;

use super::parse_option;
use crate::agent::{AgentContext, ProcessingUnit};
use crate::error::{PipelineError, Result};
use crate::messaging::Message;

pub const NAME: &str = "sequence";

#[derive(Debug, Clone, Default)]
pub struct SequenceProcessor {
    start: i64,
    count: u64,
    /// When set, each message carries its position under this property
    index_property: Option<String>,
}

impl SequenceProcessor {
    pub fn new(start: i64, count: u64) -> Self {
        Self {
            start,
            count,
            index_property: None,
        }
    }

    /// Value emitted at `index`, or `None` once it leaves the `i64` range
    fn value_at(&self, index: u64) -> Option<i64> {
        i64::try_from(index).ok().and_then(|offset| self.start.checked_add(offset))
    }
}

#[async_trait]
impl ProcessingUnit for SequenceProcessor {
    fn name(&self) -> &str {
        NAME
    }

    fn configure(&mut self, options: &HashMap<String, String>) -> Result<()> {
        self.count = parse_option(NAME, options, "count")?.ok_or_else(|| {
            PipelineError::configuration("processor sequence requires the count option")
        })?;
        self.start = parse_option(NAME, options, "start")?.unwrap_or(0);
        self.index_property = options
            .get("property")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        if self.count > 0 && self.value_at(self.count - 1).is_none() {
            return Err(PipelineError::configuration(format!(
                "processor sequence: start {} with count {} runs past {}",
                self.start,
                self.count,
                i64::MAX
            )));
        }
        Ok(())
    }

    async fn consume(&mut self, _batch: Vec<Message>, _context: &AgentContext) -> anyhow::Result<()> {
        anyhow::bail!("processor sequence only produces; bind it to an agent without a read queue")
    }

    async fn produce(&mut self, context: &AgentContext) -> anyhow::Result<()> {
        let mut emitted = 0_u64;
        for index in 0..self.count {
            if context.is_shutdown_requested() {
                info!(agent = %context.agent_name(), emitted = emitted, "Sequence interrupted by shutdown");
                break;
            }

            let value = self
                .value_at(index)
                .ok_or_else(|| anyhow::anyhow!("sequence value at index {index} overflows i64"))?;
            match &self.index_property {
                Some(property) => {
                    let message = Message::new(&value)?.with_property(property.clone(), index.to_string());
                    context.send_message(message).await?;
                }
                None => {
                    context.send(&value).await?;
                }
            }
            emitted += 1;
        }

        context.flush().await?;
        info!(agent = %context.agent_name(), emitted = emitted, "Sequence complete");
        Ok(())
    }
}
