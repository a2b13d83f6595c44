//! End-to-end run of a configured pipeline on the in-memory broker.

use std::fs;
use std::time::Duration;

use pipeline_core::bootstrap::build_coordinator;
use pipeline_core::config::ConfigManager;
use pipeline_core::processors::ProcessorRegistry;
use pipeline_core::AgentState;

const PIPELINE: &str = r#"
[broker]
provider = "in_memory"

[[agents]]
name = "numbers"
write_queue = "numbers"
processor = "sequence"
send_size = 7
options = { count = "25", start = "100", property = "position" }

[[agents]]
name = "relay"
read_queue = "numbers"
write_queue = "relayed"
processor = "forward"
read_size = 10
receive_timeout_ms = 50

[[agents]]
name = "printer"
read_queue = "relayed"
processor = "log"
read_size = 4
receive_timeout_ms = 50
ack_mode = "auto"
"#;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_configured_pipeline_runs_to_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("pipeline.toml"), PIPELINE).unwrap();
    let manager =
        ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test").unwrap();

    let mut coordinator = build_coordinator(manager.config(), &ProcessorRegistry::with_builtins())
        .await
        .unwrap();
    coordinator.start().unwrap();

    let printer = coordinator.statuses()[2].clone();
    let delivered = tokio::time::timeout(Duration::from_secs(10), async {
        while printer.stats().messages_received < 25 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(delivered.is_ok(), "printer saw {:?}", printer.stats());

    coordinator.shutdown();
    assert!(coordinator
        .wait_for_completion_timeout(Duration::from_secs(5))
        .await
        .unwrap());

    let report = coordinator.join().await.unwrap();
    assert!(report.all_succeeded(), "{report:?}");

    let numbers = &report.agents[0];
    assert_eq!(numbers.state, AgentState::Completed);
    assert_eq!(numbers.stats.messages_sent, 25);
    assert_eq!(numbers.stats.flushes, 4);

    let relay = &report.agents[1];
    assert_eq!(relay.stats.messages_received, 25);
    assert_eq!(relay.stats.messages_sent, 25);
    assert_eq!(relay.stats.batches_failed, 0);
}
