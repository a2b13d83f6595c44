//! Re-sends every consumed message to the agent's write queue.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use super::parse_option;
use crate::agent::{AgentContext, ProcessingUnit};
use crate::error::{PipelineError, Result};
use crate::messaging::Message;

pub const NAME: &str = "forward";

#[derive(Debug, Clone)]
pub struct ForwardProcessor {
    flush_each_batch: bool,
}

impl Default for ForwardProcessor {
    fn default() -> Self {
        Self {
            flush_each_batch: true,
        }
    }
}

impl ForwardProcessor {
    pub fn flush_each_batch(&self) -> bool {
        self.flush_each_batch
    }
}

#[async_trait]
impl ProcessingUnit for ForwardProcessor {
    fn name(&self) -> &str {
        NAME
    }

    fn configure(&mut self, options: &HashMap<String, String>) -> Result<()> {
        if let Some(flush) = parse_option(NAME, options, "flush_each_batch")? {
            self.flush_each_batch = flush;
        }
        Ok(())
    }

    async fn consume(&mut self, batch: Vec<Message>, context: &AgentContext) -> anyhow::Result<()> {
        let count = batch.len();
        for message in batch {
            match context.send_message(message.clone()).await {
                Ok(_) => {}
                // A batch may carry several body types; start a new envelope per type
                Err(PipelineError::MixedSendBuffer { .. }) => {
                    context.flush().await?;
                    context.send_message(message).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        if self.flush_each_batch {
            context.flush().await?;
        }
        debug!(agent = %context.agent_name(), count = count, "Forwarded batch");
        Ok(())
    }
}
