//! Shared fixtures for integration tests: a scripted messaging service that
//! records every broker interaction into an ordered event log, and processing
//! units that record their dispatches into the same log.

#![allow(dead_code)]

pub mod strategies;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use pipeline_core::agent::{AgentContext, ProcessingUnit};
use pipeline_core::coordinator::{CompletionLatch, ShutdownSignal, StartGate};
use pipeline_core::messaging::{
    encode_envelope, Delivery, Message, MessageId, MessagingError, MessagingResult,
    MessagingService, ReceiptHandle,
};
use pipeline_core::{QueueAgent, Result};

/// One broker or processor interaction, in the order it happened
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    QueueEnsured(String),
    Received(String),
    TimedOut,
    Acked(Vec<String>),
    Sent { queue: String, payload: Value },
    Dispatched { agent: String, bodies: Vec<Value> },
    Produced { agent: String },
}

#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn push(&self, event: Event) {
        self.0.lock().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().clone()
    }

    pub fn dispatches(&self) -> Vec<Vec<Value>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Dispatched { bodies, .. } => Some(bodies),
                _ => None,
            })
            .collect()
    }

    pub fn acks(&self) -> Vec<Vec<String>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Acked(receipts) => Some(receipts),
                _ => None,
            })
            .collect()
    }

    pub fn sent(&self) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Sent { payload, .. } => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn position(&self, predicate: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events().iter().position(predicate)
    }
}

/// What the scripted service does on the next `receive`
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Deliver(Value),
    Timeout,
    Fail(String),
}

impl ScriptStep {
    pub fn deliver_ints(values: &[i64]) -> Self {
        ScriptStep::Deliver(int_envelope(values))
    }
}

/// Messaging service that replays a fixed script of receive outcomes
pub struct ScriptedMessagingService {
    script: Mutex<VecDeque<ScriptStep>>,
    log: EventLog,
    next_id: AtomicU64,
    shutdown_when_exhausted: Option<ShutdownSignal>,
    gate: OnceLock<StartGate>,
    io_before_gate: AtomicUsize,
}

impl ScriptedMessagingService {
    pub fn new(script: Vec<ScriptStep>, log: EventLog) -> Self {
        Self {
            script: Mutex::new(script.into()),
            log,
            next_id: AtomicU64::new(1),
            shutdown_when_exhausted: None,
            gate: OnceLock::new(),
            io_before_gate: AtomicUsize::new(0),
        }
    }

    /// Once the script runs out, request shutdown and stop delivering
    pub fn shutdown_when_exhausted(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown_when_exhausted = Some(shutdown);
        self
    }

    /// Count broker calls made while `gate` is still closed
    pub fn watch_gate(&self, gate: StartGate) {
        let _ = self.gate.set(gate);
    }

    pub fn io_before_gate(&self) -> usize {
        self.io_before_gate.load(Ordering::SeqCst)
    }

    fn check_gate(&self) {
        if let Some(gate) = self.gate.get() {
            if !gate.is_open() {
                self.io_before_gate.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

#[async_trait]
impl MessagingService for ScriptedMessagingService {
    async fn ensure_queue(&self, queue_name: &str) -> MessagingResult<()> {
        self.check_gate();
        self.log.push(Event::QueueEnsured(queue_name.to_string()));
        Ok(())
    }

    async fn send_envelope(&self, queue_name: &str, payload: Value) -> MessagingResult<MessageId> {
        self.check_gate();
        self.log.push(Event::Sent {
            queue: queue_name.to_string(),
            payload,
        });
        Ok(MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) as i64))
    }

    async fn receive(
        &self,
        _queue_name: &str,
        wait: Duration,
        _visibility_timeout: Duration,
    ) -> MessagingResult<Option<Delivery>> {
        self.check_gate();
        let step = self.script.lock().pop_front();
        match step {
            Some(ScriptStep::Deliver(payload)) => {
                let receipt = format!("r{}", self.next_id.fetch_add(1, Ordering::SeqCst));
                self.log.push(Event::Received(receipt.clone()));
                Ok(Some(Delivery {
                    payload,
                    receipt: ReceiptHandle::new(receipt),
                    receive_count: 1,
                    enqueued_at: Utc::now(),
                }))
            }
            Some(ScriptStep::Timeout) => {
                self.log.push(Event::TimedOut);
                Ok(None)
            }
            Some(ScriptStep::Fail(message)) => Err(MessagingError::connection(message)),
            None => match &self.shutdown_when_exhausted {
                Some(shutdown) => {
                    shutdown.trigger();
                    std::future::pending().await
                }
                None => {
                    tokio::time::sleep(wait).await;
                    Ok(None)
                }
            },
        }
    }

    async fn acknowledge(&self, _queue_name: &str, receipts: &[ReceiptHandle]) -> MessagingResult<()> {
        self.check_gate();
        self.log.push(Event::Acked(
            receipts.iter().map(|r| r.as_str().to_string()).collect(),
        ));
        Ok(())
    }

    async fn queue_depth(&self, _queue_name: &str) -> MessagingResult<u64> {
        Ok(self.script.lock().len() as u64)
    }

    async fn health_check(&self) -> MessagingResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

/// Consumer that records each batch and can be told to fail
#[derive(Debug, Default)]
pub struct RecordingProcessor {
    log: EventLog,
    fail_on_batch_size: Option<usize>,
    forward: bool,
    pub configured_with: HashMap<String, String>,
}

impl RecordingProcessor {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Fail every batch of exactly `size` messages
    pub fn failing_on(mut self, size: usize) -> Self {
        self.fail_on_batch_size = Some(size);
        self
    }

    /// Re-send every consumed body through the agent
    pub fn forwarding(mut self) -> Self {
        self.forward = true;
        self
    }
}

#[async_trait]
impl ProcessingUnit for RecordingProcessor {
    fn name(&self) -> &str {
        "recording"
    }

    fn configure(&mut self, options: &HashMap<String, String>) -> Result<()> {
        self.configured_with = options.clone();
        Ok(())
    }

    async fn consume(&mut self, batch: Vec<Message>, context: &AgentContext) -> anyhow::Result<()> {
        let bodies: Vec<Value> = batch.iter().map(|m| m.body().clone()).collect();
        self.log.push(Event::Dispatched {
            agent: context.agent_name().to_string(),
            bodies,
        });

        if self.fail_on_batch_size == Some(batch.len()) {
            anyhow::bail!("refusing batch of {}", batch.len());
        }
        if self.forward {
            for message in &batch {
                context.send(&message.body_as::<i64>()?).await?;
            }
        }
        Ok(())
    }
}

/// Producer that sends a fixed list of integers, optionally after a release signal
#[derive(Debug)]
pub struct IntProducer {
    log: EventLog,
    values: Vec<i64>,
    release: Option<oneshot::Receiver<()>>,
}

impl IntProducer {
    pub fn new(log: EventLog, values: Vec<i64>) -> Self {
        Self {
            log,
            values,
            release: None,
        }
    }

    pub fn released_by(mut self, release: oneshot::Receiver<()>) -> Self {
        self.release = Some(release);
        self
    }
}

#[async_trait]
impl ProcessingUnit for IntProducer {
    fn name(&self) -> &str {
        "int_producer"
    }

    async fn consume(&mut self, _batch: Vec<Message>, _context: &AgentContext) -> anyhow::Result<()> {
        anyhow::bail!("int_producer only produces")
    }

    async fn produce(&mut self, context: &AgentContext) -> anyhow::Result<()> {
        if let Some(release) = self.release.take() {
            let _ = release.await;
        }
        for value in &self.values {
            context.send(value).await?;
        }
        self.log.push(Event::Produced {
            agent: context.agent_name().to_string(),
        });
        Ok(())
    }
}

/// Envelope payload carrying one `i64` message per value
pub fn int_envelope(values: &[i64]) -> Value {
    let messages: Vec<Message> = values
        .iter()
        .map(|value| Message::new(value).expect("i64 serializes"))
        .collect();
    encode_envelope(&messages).expect("envelope encodes")
}

/// Integer bodies of an envelope payload, in order
pub fn envelope_ints(payload: &Value) -> Vec<i64> {
    payload
        .as_array()
        .expect("envelope is an array")
        .iter()
        .map(|item| item["body"].as_i64().expect("integer body"))
        .collect()
}

/// Run a single agent outside a coordinator, with an already-open gate
pub async fn run_single(agent: QueueAgent, shutdown: ShutdownSignal) -> Result<()> {
    let gate = StartGate::new();
    gate.open();
    let latch = CompletionLatch::new(1);
    let result = agent.run(gate, latch.guard(), shutdown).await;
    assert_eq!(latch.remaining(), 0, "agent must signal completion");
    result
}
