use crate::monitoring::TailerEvent;
use crate::tailer::{ShardTailer, TailSummary, TailerConfig};
use crate::test::mocks::{MockKinesisClient, MockRecordHandler};
use crate::test::TestUtils;
use crate::Result;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

pub const TEST_STREAM: &str = "test-stream";

pub fn create_test_config() -> TailerConfig {
    TestUtils::fast_config(TEST_STREAM)
}

/// Run a tailer over scripted responses until it stops on its own
///
/// The shutdown sender stays alive for the whole run, so only a closed shard
/// or an error ends it.
pub async fn run_to_completion(
    config: TailerConfig,
    client: &MockKinesisClient,
    handler: &MockRecordHandler,
) -> Result<TailSummary> {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (tailer, _monitoring_rx) = ShardTailer::new(config, handler.clone(), client.clone());

    tokio::time::timeout(Duration::from_secs(5), tailer.run(shutdown_rx))
        .await
        .expect("tailer did not finish in time")
}

/// Drain whatever events are buffered without waiting
pub fn drain_events(rx: &mut mpsc::Receiver<TailerEvent>) -> Vec<TailerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
