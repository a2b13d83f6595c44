//! # In-Memory Messaging Service
//!
//! Process-local queue implementation for tests, demos and single-binary pipelines.
//!
//! ## Features
//!
//! - **Visibility Timeout**: deliveries become invisible on receive and reappear
//!   if they are not acknowledged in time
//! - **Blocking Receive**: readers park on a per-queue `Notify` until an envelope
//!   arrives, an invisible envelope expires, or the wait elapses
//! - **Thread-Safe**: queues live in a `DashMap`, each guarded by its own mutex

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::messaging::service::{Delivery, MessageId, MessagingService, ReceiptHandle};
use crate::messaging::{MessagingError, MessagingResult};

/// Stored envelope with visibility tracking
#[derive(Debug, Clone)]
struct StoredEnvelope {
    id: u64,
    payload: serde_json::Value,
    enqueued_at: DateTime<Utc>,
    /// When the envelope becomes visible again (None = visible now)
    visible_at: Option<Instant>,
    receive_count: u32,
}

#[derive(Debug)]
struct InMemoryQueue {
    envelopes: Mutex<VecDeque<StoredEnvelope>>,
    arrivals: Notify,
    next_id: AtomicU64,
    total_sent: AtomicU64,
    total_received: AtomicU64,
    total_acked: AtomicU64,
}

impl InMemoryQueue {
    fn new() -> Self {
        Self {
            envelopes: Mutex::new(VecDeque::new()),
            arrivals: Notify::new(),
            next_id: AtomicU64::new(1),
            total_sent: AtomicU64::new(0),
            total_received: AtomicU64::new(0),
            total_acked: AtomicU64::new(0),
        }
    }

    /// Hand out the oldest visible envelope, or report when the next one reappears
    fn take_visible(&self, visibility_timeout: Duration) -> (Option<Delivery>, Option<Instant>) {
        let now = Instant::now();
        let mut envelopes = self.envelopes.lock();
        let mut next_visible: Option<Instant> = None;

        for envelope in envelopes.iter_mut() {
            match envelope.visible_at {
                Some(at) if at > now => {
                    next_visible = Some(next_visible.map_or(at, |current| current.min(at)));
                }
                _ => {
                    envelope.visible_at = Some(now + visibility_timeout);
                    envelope.receive_count += 1;
                    self.total_received.fetch_add(1, Ordering::Relaxed);

                    let delivery = Delivery {
                        payload: envelope.payload.clone(),
                        receipt: ReceiptHandle::new(envelope.id.to_string()),
                        receive_count: envelope.receive_count,
                        enqueued_at: envelope.enqueued_at,
                    };
                    return (Some(delivery), None);
                }
            }
        }

        (None, next_visible)
    }
}

/// In-memory messaging service
///
/// ```rust
/// use pipeline_core::messaging::{InMemoryMessagingService, MessagingService};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let service = InMemoryMessagingService::new();
/// service.ensure_queue("points").await?;
/// service.send_envelope("points", serde_json::json!([])).await?;
///
/// let delivery = service
///     .receive("points", Duration::from_millis(100), Duration::from_secs(30))
///     .await?;
/// assert!(delivery.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryMessagingService {
    queues: DashMap<String, Arc<InMemoryQueue>>,
}

impl InMemoryMessagingService {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
        }
    }

    /// Create with pre-initialized queues
    pub fn with_queues(queue_names: &[&str]) -> Self {
        let service = Self::new();
        for name in queue_names {
            service
                .queues
                .insert((*name).to_string(), Arc::new(InMemoryQueue::new()));
        }
        service
    }

    fn queue(&self, queue_name: &str) -> MessagingResult<Arc<InMemoryQueue>> {
        self.queues
            .get(queue_name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))
    }

    /// Number of stored envelopes, visible or in flight (for testing)
    pub fn queue_length(&self, queue_name: &str) -> usize {
        self.queue(queue_name)
            .map(|q| q.envelopes.lock().len())
            .unwrap_or(0)
    }

    /// Number of envelopes received but not yet acknowledged or expired
    pub fn in_flight_count(&self, queue_name: &str) -> usize {
        let now = Instant::now();
        self.queue(queue_name)
            .map(|q| {
                q.envelopes
                    .lock()
                    .iter()
                    .filter(|e| e.visible_at.is_some_and(|at| at > now))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Total envelopes sent to a queue since creation
    pub fn total_sent(&self, queue_name: &str) -> u64 {
        self.queue(queue_name)
            .map(|q| q.total_sent.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Total acknowledged envelopes for a queue since creation
    pub fn total_acked(&self, queue_name: &str) -> u64 {
        self.queue(queue_name)
            .map(|q| q.total_acked.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Remove and return every stored payload, oldest first (for testing)
    pub fn drain(&self, queue_name: &str) -> Vec<serde_json::Value> {
        self.queue(queue_name)
            .map(|q| {
                q.envelopes
                    .lock()
                    .drain(..)
                    .map(|envelope| envelope.payload)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessagingService for InMemoryMessagingService {
    async fn ensure_queue(&self, queue_name: &str) -> MessagingResult<()> {
        self.queues
            .entry(queue_name.to_string())
            .or_insert_with(|| Arc::new(InMemoryQueue::new()));
        Ok(())
    }

    async fn send_envelope(
        &self,
        queue_name: &str,
        payload: serde_json::Value,
    ) -> MessagingResult<MessageId> {
        let queue = self.queue(queue_name)?;
        let id = queue.next_id.fetch_add(1, Ordering::Relaxed);

        queue.envelopes.lock().push_back(StoredEnvelope {
            id,
            payload,
            enqueued_at: Utc::now(),
            visible_at: None,
            receive_count: 0,
        });
        queue.total_sent.fetch_add(1, Ordering::Relaxed);
        queue.arrivals.notify_waiters();

        debug!(queue = %queue_name, message_id = id, "Envelope enqueued");
        Ok(MessageId(id as i64))
    }

    async fn receive(
        &self,
        queue_name: &str,
        wait: Duration,
        visibility_timeout: Duration,
    ) -> MessagingResult<Option<Delivery>> {
        let queue = self.queue(queue_name)?;
        let deadline = Instant::now() + wait;

        loop {
            // Register interest before looking so an arrival between the check and
            // the await still wakes us.
            let notified = queue.arrivals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (delivery, next_visible) = queue.take_visible(visibility_timeout);
            if delivery.is_some() {
                return Ok(delivery);
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            let wake_at = next_visible.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn acknowledge(
        &self,
        queue_name: &str,
        receipts: &[ReceiptHandle],
    ) -> MessagingResult<()> {
        let queue = self.queue(queue_name)?;
        let ids = receipts
            .iter()
            .map(|receipt| {
                receipt
                    .as_str()
                    .parse::<u64>()
                    .map_err(|_| MessagingError::invalid_receipt_handle(receipt.as_str()))
            })
            .collect::<MessagingResult<Vec<u64>>>()?;

        let mut envelopes = queue.envelopes.lock();
        for id in ids {
            match envelopes.iter().position(|e| e.id == id) {
                Some(pos) => {
                    envelopes.remove(pos);
                    queue.total_acked.fetch_add(1, Ordering::Relaxed);
                }
                None => warn!(
                    queue = %queue_name,
                    message_id = id,
                    "Acknowledged envelope is no longer stored"
                ),
            }
        }
        Ok(())
    }

    async fn queue_depth(&self, queue_name: &str) -> MessagingResult<u64> {
        let queue = self.queue(queue_name)?;
        let depth = queue.envelopes.lock().len() as u64;
        Ok(depth)
    }

    async fn health_check(&self) -> MessagingResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LONG_VT: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_send_receive_ack() {
        let service = InMemoryMessagingService::with_queues(&["points"]);
        service.send_envelope("points", json!([1])).await.unwrap();

        let delivery = service
            .receive("points", Duration::from_millis(10), LONG_VT)
            .await
            .unwrap()
            .expect("delivery");
        assert_eq!(delivery.payload, json!([1]));
        assert_eq!(delivery.receive_count, 1);
        assert_eq!(service.in_flight_count("points"), 1);

        service
            .acknowledge("points", &[delivery.receipt])
            .await
            .unwrap();
        assert_eq!(service.queue_length("points"), 0);
        assert_eq!(service.total_acked("points"), 1);
    }

    #[tokio::test]
    async fn test_receive_times_out_on_empty_queue() {
        let service = InMemoryMessagingService::with_queues(&["empty"]);
        let delivery = service
            .receive("empty", Duration::from_millis(20), LONG_VT)
            .await
            .unwrap();
        assert!(delivery.is_none());
    }

    #[tokio::test]
    async fn test_receive_preserves_fifo_order() {
        let service = InMemoryMessagingService::with_queues(&["fifo"]);
        for i in 0..3 {
            service.send_envelope("fifo", json!([i])).await.unwrap();
        }

        for i in 0..3 {
            let delivery = service
                .receive("fifo", Duration::from_millis(10), LONG_VT)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(delivery.payload, json!([i]));
        }
    }

    #[tokio::test]
    async fn test_unacknowledged_delivery_reappears() {
        let service = InMemoryMessagingService::with_queues(&["retry"]);
        service.send_envelope("retry", json!([])).await.unwrap();

        let first = service
            .receive("retry", Duration::from_millis(10), Duration::from_millis(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.receive_count, 1);

        let second = service
            .receive("retry", Duration::from_millis(500), Duration::from_millis(30))
            .await
            .unwrap()
            .expect("redelivery after visibility timeout");
        assert_eq!(second.receive_count, 2);
        assert_eq!(second.receipt, first.receipt);
    }

    #[tokio::test]
    async fn test_blocked_receiver_wakes_on_send() {
        let service = Arc::new(InMemoryMessagingService::with_queues(&["wake"]));

        let reader = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .receive("wake", Duration::from_secs(5), LONG_VT)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        service.send_envelope("wake", json!(["late"])).await.unwrap();

        let delivery = reader.await.unwrap().unwrap().expect("woken by send");
        assert_eq!(delivery.payload, json!(["late"]));
    }

    #[tokio::test]
    async fn test_unknown_queue_is_an_error() {
        let service = InMemoryMessagingService::new();
        let err = service.send_envelope("missing", json!([])).await.unwrap_err();
        assert!(matches!(err, MessagingError::QueueNotFound { .. }));
    }

    #[tokio::test]
    async fn test_invalid_receipt_handle() {
        let service = InMemoryMessagingService::with_queues(&["q"]);
        let err = service
            .acknowledge("q", &[ReceiptHandle::new("not-a-number")])
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::InvalidReceiptHandle { .. }));
    }
}
