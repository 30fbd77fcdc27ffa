// tests/common/mod.rs
#![allow(dead_code)]

use anyhow::Result;
use kinesis_tail::test::TestUtils;
use kinesis_tail::TailerConfig;
use std::future::Future;
use std::sync::Once;
use std::time::Duration;

pub const TEST_STREAM: &str = "TestingDataStream";

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("kinesis_tail=debug".parse().unwrap()),
            )
            .with_test_writer()
            .with_thread_ids(true)
            .try_init()
            .ok();
    });
}

pub fn create_test_config() -> TailerConfig {
    TestUtils::fast_config(TEST_STREAM)
}

/// Poll `check` until it returns true or `timeout` passes
pub async fn wait_for<F, Fut>(mut check: F, timeout: Duration) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while !check().await {
        if start.elapsed() > timeout {
            anyhow::bail!("Condition not met within {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}
