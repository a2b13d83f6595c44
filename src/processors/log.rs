//! Terminal consumer that logs each message it receives.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::info;

use crate::agent::{AgentContext, ProcessingUnit};
use crate::error::Result;
use crate::messaging::Message;

pub const NAME: &str = "log";

#[derive(Debug, Clone, Default)]
pub struct LogProcessor {
    label: Option<String>,
    seen: u64,
}

impl LogProcessor {
    pub fn seen(&self) -> u64 {
        self.seen
    }
}

#[async_trait]
impl ProcessingUnit for LogProcessor {
    fn name(&self) -> &str {
        NAME
    }

    fn configure(&mut self, options: &HashMap<String, String>) -> Result<()> {
        self.label = options.get("label").cloned();
        Ok(())
    }

    async fn consume(&mut self, batch: Vec<Message>, context: &AgentContext) -> anyhow::Result<()> {
        let label = self.label.as_deref().unwrap_or(context.agent_name());
        for message in &batch {
            self.seen += 1;
            info!(
                label = %label,
                sequence = self.seen,
                body_type = %message.body_type(),
                body = %message.body(),
                properties = ?message.properties(),
                "📨 Message"
            );
        }
        Ok(())
    }
}
