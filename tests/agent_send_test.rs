//! Send buffer and producer-mode behavior, plus agent validation.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

use common::*;
use pipeline_core::agent::{AgentContext, AgentStatus, Outbox, ProcessingUnit, WriteEndpoint};
use pipeline_core::config::AgentConfig;
use pipeline_core::coordinator::ShutdownSignal;
use pipeline_core::messaging::{decode_envelope, Message};
use pipeline_core::{AgentCoordinator, AgentState, PipelineError, QueueAgent};

fn scripted_outbox(send_size: usize, log: &EventLog) -> Outbox {
    let service = Arc::new(ScriptedMessagingService::new(Vec::new(), log.clone()));
    Outbox::new(
        "writer",
        Some(WriteEndpoint {
            service,
            queue: "output".to_string(),
        }),
        send_size,
        Arc::new(AgentStatus::new("writer")),
    )
}

/// Producer that sends strings and records what each `send` returned
struct StringSender {
    values: Vec<&'static str>,
    returned: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl ProcessingUnit for StringSender {
    fn name(&self) -> &str {
        "string_sender"
    }

    async fn consume(&mut self, _batch: Vec<Message>, _context: &AgentContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn produce(&mut self, context: &AgentContext) -> anyhow::Result<()> {
        for value in &self.values {
            let flushed = context.send(*value).await?;
            self.returned.lock().push(flushed);
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_second_send_flushes_pair() {
    let log = EventLog::default();
    let service = Arc::new(ScriptedMessagingService::new(Vec::new(), log.clone()));
    let returned = Arc::new(Mutex::new(Vec::new()));

    let mut agent = QueueAgent::new(
        AgentConfig::new("producer")
            .with_write_queue("output")
            .with_send_size(2),
    )
    .with_writer(service);
    agent
        .bind_processor(Box::new(StringSender {
            values: vec!["A", "B"],
            returned: returned.clone(),
        }))
        .unwrap();

    assert_ok!(run_single(agent, ShutdownSignal::new()).await);

    assert_eq!(*returned.lock(), vec![0, 2]);
    let sent = log.sent();
    assert_eq!(sent.len(), 1);
    let messages = decode_envelope(sent[0].clone(), None).unwrap();
    let bodies: Vec<_> = messages.iter().map(|m| m.body().clone()).collect();
    assert_eq!(bodies, vec![json!("A"), json!("B")]);
}

#[tokio::test]
async fn test_send_at_threshold_minus_one_flushes_once() {
    let log = EventLog::default();
    let outbox = scripted_outbox(4, &log);

    for value in 0..3_i64 {
        assert_eq!(outbox.send(&value).await.unwrap(), 0);
    }
    assert_eq!(outbox.buffered().await, 3);

    assert_eq!(outbox.send(&3_i64).await.unwrap(), 4);
    assert_eq!(outbox.buffered().await, 0);
    assert_eq!(log.sent().len(), 1);
    assert_eq!(envelope_ints(&log.sent()[0]), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_flush_on_empty_buffer_transmits_nothing() {
    let log = EventLog::default();
    let outbox = scripted_outbox(4, &log);

    assert_eq!(outbox.flush().await.unwrap(), 0);
    assert!(log.sent().is_empty());

    outbox.send(&1_i64).await.unwrap();
    assert_eq!(outbox.flush().await.unwrap(), 1);
    assert_eq!(outbox.flush().await.unwrap(), 0);
    assert_eq!(log.sent().len(), 1);
}

#[tokio::test]
async fn test_concurrent_senders_never_lose_items() {
    let log = EventLog::default();
    let outbox = Arc::new(scripted_outbox(3, &log));

    let mut handles = Vec::new();
    for task in 0..4_i64 {
        let outbox = outbox.clone();
        handles.push(tokio::spawn(async move {
            for n in 0..25_i64 {
                outbox.send(&(task * 100 + n)).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    outbox.flush().await.unwrap();

    let sent = log.sent();
    let total: usize = sent.iter().map(|payload| envelope_ints(payload).len()).sum();
    assert_eq!(total, 100);
    assert!(sent.iter().all(|payload| envelope_ints(payload).len() <= 3));
}

#[tokio::test]
async fn test_producer_runs_once_and_flushes_remainder() {
    let log = EventLog::default();
    let service = Arc::new(ScriptedMessagingService::new(Vec::new(), log.clone()));

    let mut agent = QueueAgent::new(
        AgentConfig::new("numbers")
            .with_write_queue("numbers")
            .with_send_size(4),
    )
    .with_writer(service);
    agent
        .bind_processor(Box::new(IntProducer::new(log.clone(), (1..=6).collect())))
        .unwrap();
    let status = agent.status();

    run_single(agent, ShutdownSignal::new()).await.unwrap();

    let produced = log
        .events()
        .iter()
        .filter(|e| matches!(e, Event::Produced { .. }))
        .count();
    assert_eq!(produced, 1);

    let sent: Vec<Vec<i64>> = log.sent().iter().map(envelope_ints).collect();
    assert_eq!(sent, vec![vec![1, 2, 3, 4], vec![5, 6]]);
    assert_eq!(status.state(), AgentState::Completed);
    assert_eq!(status.stats().messages_sent, 6);
}

#[tokio::test]
async fn test_producer_without_produce_support_fails() {
    let log = EventLog::default();
    let service = Arc::new(ScriptedMessagingService::new(Vec::new(), log.clone()));

    let mut agent = QueueAgent::new(AgentConfig::new("confused").with_write_queue("output"))
        .with_writer(service);
    agent
        .bind_processor(Box::new(RecordingProcessor::new(log.clone())))
        .unwrap();
    let status = agent.status();

    let err = assert_err!(run_single(agent, ShutdownSignal::new()).await);
    assert!(matches!(err, PipelineError::Processing { .. }));
    assert!(matches!(status.state(), AgentState::Failed { .. }));
}

#[tokio::test]
async fn test_send_without_write_queue_stops_the_agent() {
    let log = EventLog::default();
    let shutdown = ShutdownSignal::new();
    let service = Arc::new(
        ScriptedMessagingService::new(vec![ScriptStep::deliver_ints(&[1])], log.clone())
            .shutdown_when_exhausted(shutdown.clone()),
    );

    let mut agent = QueueAgent::new(
        AgentConfig::new("reader")
            .with_read_queue("input")
            .with_read_size(1),
    )
    .with_reader(service);
    agent
        .bind_processor(Box::new(RecordingProcessor::new(log.clone()).forwarding()))
        .unwrap();

    let err = run_single(agent, shutdown).await.unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));
    assert!(log.acks().is_empty());
}

#[test]
fn test_agent_without_processor_is_rejected() {
    let log = EventLog::default();
    let service = Arc::new(ScriptedMessagingService::new(Vec::new(), log));
    let agent = QueueAgent::new(AgentConfig::new("idle").with_read_queue("input")).with_reader(service);

    assert!(matches!(
        agent.validate().unwrap_err(),
        PipelineError::Configuration(_)
    ));

    let mut coordinator = AgentCoordinator::new();
    assert!(coordinator.add_agent(agent).is_err());
    assert_eq!(coordinator.agent_count(), 0);
}

#[test]
fn test_agent_without_service_is_rejected() {
    let log = EventLog::default();
    let mut agent = QueueAgent::new(AgentConfig::new("detached").with_write_queue("output"));
    agent
        .bind_processor(Box::new(RecordingProcessor::new(log)))
        .unwrap();

    let err = agent.validate().unwrap_err();
    assert!(err.to_string().contains("no writer service"));
}

#[test]
fn test_processor_binds_to_one_agent_at_a_time() {
    let log = EventLog::default();
    let mut agent = QueueAgent::new(
        AgentConfig::new("reader")
            .with_read_queue("input")
            .with_option("threshold", "0.5"),
    );

    agent
        .bind_processor(Box::new(RecordingProcessor::new(log.clone())))
        .unwrap();
    assert_eq!(agent.config().processor.as_deref(), Some("recording"));

    let err = agent
        .bind_processor(Box::new(RecordingProcessor::new(log.clone())))
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidState(_)));

    let unbound = agent.unbind_processor();
    assert!(unbound.is_some());
    assert!(agent.unbind_processor().is_none());
    assert!(agent
        .bind_processor(Box::new(RecordingProcessor::new(log)))
        .is_ok());
}

#[test]
fn test_configure_receives_agent_options() {
    struct Strict;

    #[async_trait]
    impl ProcessingUnit for Strict {
        fn name(&self) -> &str {
            "strict"
        }

        fn configure(&mut self, options: &HashMap<String, String>) -> pipeline_core::Result<()> {
            match options.get("mode").map(String::as_str) {
                Some("fast") | Some("slow") => Ok(()),
                other => Err(PipelineError::configuration(format!("bad mode: {other:?}"))),
            }
        }

        async fn consume(&mut self, _batch: Vec<Message>, _context: &AgentContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    let mut good = QueueAgent::new(AgentConfig::new("a").with_read_queue("q").with_option("mode", "fast"));
    assert!(good.bind_processor(Box::new(Strict)).is_ok());

    let mut bad = QueueAgent::new(AgentConfig::new("b").with_read_queue("q").with_option("mode", "warp"));
    let err = bad.bind_processor(Box::new(Strict)).unwrap_err();
    assert!(err.to_string().contains("warp"));
}
