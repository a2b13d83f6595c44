//! # PGMQ Messaging Service
//!
//! `MessagingService` backed by the pgmq Postgres extension, driven through its SQL
//! API with `sqlx`. pgmq's visibility timeout provides the redelivery guarantee for
//! envelopes an agent never acknowledged.
//!
//! pgmq reads do not block server-side, so `receive` polls at a configurable
//! interval until the caller's wait elapses.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::messaging::service::{Delivery, MessageId, MessagingService, ReceiptHandle};
use crate::messaging::{MessagingError, MessagingResult};

#[derive(Debug, Clone)]
pub struct PgmqMessagingService {
    pool: PgPool,
    poll_interval: Duration,
}

impl PgmqMessagingService {
    /// Connect to the database hosting the pgmq extension
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        poll_interval: Duration,
    ) -> MessagingResult<Self> {
        info!("🚀 Connecting to pgmq (max_connections: {})", max_connections);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("✅ Connected to pgmq");
        Ok(Self::new_with_pool(pool, poll_interval))
    }

    /// Create a service on an existing connection pool
    pub fn new_with_pool(pool: PgPool, poll_interval: Duration) -> Self {
        Self {
            pool,
            poll_interval,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn read_one(
        &self,
        queue_name: &str,
        visibility_seconds: i32,
    ) -> MessagingResult<Option<Delivery>> {
        let row = sqlx::query(
            "SELECT msg_id, read_ct, enqueued_at, message FROM pgmq.read($1, $2, 1)",
        )
        .bind(queue_name)
        .bind(visibility_seconds)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MessagingError::queue_operation(queue_name, "read", e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let msg_id: i64 = row.try_get("msg_id")?;
        let read_ct: i32 = row.try_get("read_ct")?;
        let enqueued_at: DateTime<Utc> = row.try_get("enqueued_at")?;
        let payload: serde_json::Value = row.try_get("message")?;

        Ok(Some(Delivery {
            payload,
            receipt: ReceiptHandle::from(MessageId(msg_id)),
            receive_count: u32::try_from(read_ct).unwrap_or(0),
            enqueued_at,
        }))
    }
}

/// pgmq takes whole seconds; never round a non-zero timeout down to zero
fn visibility_seconds(visibility_timeout: Duration) -> i32 {
    let millis = visibility_timeout.as_millis();
    let seconds = millis.div_ceil(1000).max(1);
    i32::try_from(seconds).unwrap_or(i32::MAX)
}

#[async_trait]
impl MessagingService for PgmqMessagingService {
    async fn ensure_queue(&self, queue_name: &str) -> MessagingResult<()> {
        debug!("📋 Ensuring pgmq queue: {}", queue_name);

        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "create", e.to_string()))?;

        Ok(())
    }

    async fn send_envelope(
        &self,
        queue_name: &str,
        payload: serde_json::Value,
    ) -> MessagingResult<MessageId> {
        let row = sqlx::query("SELECT pgmq.send($1, $2) AS msg_id")
            .bind(queue_name)
            .bind(&payload)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "send", e.to_string()))?;

        let msg_id: i64 = row.try_get("msg_id")?;
        debug!("📤 Envelope {} sent to queue: {}", msg_id, queue_name);
        Ok(MessageId(msg_id))
    }

    async fn receive(
        &self,
        queue_name: &str,
        wait: Duration,
        visibility_timeout: Duration,
    ) -> MessagingResult<Option<Delivery>> {
        let vt = visibility_seconds(visibility_timeout);
        let deadline = Instant::now() + wait;

        loop {
            if let Some(delivery) = self.read_one(queue_name, vt).await? {
                return Ok(Some(delivery));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn acknowledge(
        &self,
        queue_name: &str,
        receipts: &[ReceiptHandle],
    ) -> MessagingResult<()> {
        if receipts.is_empty() {
            return Ok(());
        }

        let ids = receipts
            .iter()
            .map(|receipt| {
                receipt
                    .as_str()
                    .parse::<i64>()
                    .map_err(|_| MessagingError::invalid_receipt_handle(receipt.as_str()))
            })
            .collect::<MessagingResult<Vec<i64>>>()?;

        let deleted = sqlx::query("SELECT pgmq.delete($1, $2::bigint[])")
            .bind(queue_name)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                MessagingError::queue_operation(queue_name, "delete", e.to_string())
            })?;

        debug!(
            "🗑️ Acknowledged {} of {} envelopes on queue: {}",
            deleted.len(),
            ids.len(),
            queue_name
        );
        Ok(())
    }

    async fn queue_depth(&self, queue_name: &str) -> MessagingResult<u64> {
        let row = sqlx::query("SELECT queue_length FROM pgmq.metrics($1)")
            .bind(queue_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "metrics", e.to_string()))?;

        let length: i64 = row.try_get("queue_length")?;
        Ok(u64::try_from(length).unwrap_or(0))
    }

    async fn health_check(&self) -> MessagingResult<bool> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "pgmq"
    }
}
