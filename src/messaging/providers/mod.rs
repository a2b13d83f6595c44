//! # Messaging Providers
//!
//! Concrete [`MessagingService`] backends and the factory that picks one from
//! broker configuration.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod pgmq;

use std::sync::Arc;

use tracing::info;

pub use in_memory::InMemoryMessagingService;
#[cfg(feature = "postgres")]
pub use self::pgmq::PgmqMessagingService;

use crate::config::{BrokerConfig, BrokerProvider};
use crate::error::{PipelineError, Result};
use crate::messaging::MessagingService;

/// Connect the messaging service described by the broker configuration
pub async fn connect_messaging_service(config: &BrokerConfig) -> Result<Arc<dyn MessagingService>> {
    let service: Arc<dyn MessagingService> = match config.provider {
        BrokerProvider::InMemory => Arc::new(InMemoryMessagingService::new()),
        #[cfg(feature = "postgres")]
        BrokerProvider::Pgmq => {
            let database_url = config.database_url.as_deref().ok_or_else(|| {
                PipelineError::configuration("broker.database_url is required for the pgmq provider")
            })?;
            Arc::new(
                PgmqMessagingService::connect(
                    database_url,
                    config.max_connections,
                    std::time::Duration::from_millis(config.poll_interval_ms),
                )
                .await?,
            )
        }
        #[cfg(not(feature = "postgres"))]
        BrokerProvider::Pgmq => {
            return Err(PipelineError::configuration(
                "the pgmq provider requires the `postgres` feature",
            ))
        }
    };

    info!(provider = service.provider_name(), "Messaging service ready");
    Ok(service)
}
