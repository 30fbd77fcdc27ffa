//! Test utilities and mock implementations for exercising the tailer and producer


use crate::client::{PollOutput, StreamDescriptor};
use crate::retry::PollRetryPolicy;
use crate::tailer::TailerConfig;
use aws_sdk_kinesis::types::Record;
use std::sync::Once;
use std::time::Duration;

static INIT: Once = Once::new();

/// Install a test-writer subscriber once per process
pub fn init_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "kinesis_tail=debug".into()),
            )
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Helper functions for creating test data
pub struct TestUtils;

impl TestUtils {
    /// Create a test record with given sequence number and data
    pub fn create_test_record(sequence_number: &str, data: &[u8]) -> Record {
        Record::builder()
            .sequence_number(sequence_number)
            .data(aws_smithy_types::Blob::new(data.to_vec()))
            .partition_key("test-partition-key")
            .build()
            .expect("Failed to build test record")
    }

    /// Create `count` records numbered `sequence-0`..
    pub fn create_test_records(count: usize) -> Vec<Record> {
        Self::create_records_from(0, count)
    }

    pub fn create_records_from(start: usize, count: usize) -> Vec<Record> {
        (start..start + count)
            .map(|i| {
                Self::create_test_record(
                    &format!("sequence-{}", i),
                    format!("data-{}", i).as_bytes(),
                )
            })
            .collect()
    }

    pub fn create_descriptor(stream_name: &str, shards: &[&str]) -> StreamDescriptor {
        StreamDescriptor {
            stream_name: stream_name.to_string(),
            shards: shards.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn poll_output(records: Vec<Record>, next_iterator: Option<&str>) -> PollOutput {
        PollOutput {
            records,
            next_iterator: next_iterator.map(String::from),
            millis_behind_latest: Some(0),
        }
    }

    /// Config with short intervals so tests finish quickly
    pub fn fast_config(stream_name: &str) -> TailerConfig {
        TailerConfig {
            stream_name: stream_name.to_string(),
            poll_interval: Duration::from_millis(10),
            retry_policy: PollRetryPolicy::uniform(Duration::from_millis(10)),
            handler_retry_delay: Duration::from_millis(5),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_record() {
        let record = TestUtils::create_test_record("seq-1", b"test-data");
        assert_eq!(record.sequence_number(), "seq-1");
        assert_eq!(record.data().as_ref(), b"test-data");
        assert_eq!(record.partition_key(), "test-partition-key");
    }

    #[test]
    fn test_create_test_records() {
        let records = TestUtils::create_test_records(3);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].sequence_number(), "sequence-0");
        assert_eq!(records[2].sequence_number(), "sequence-2");
        assert_eq!(records[1].data().as_ref(), b"data-1");

        let later = TestUtils::create_records_from(5, 2);
        assert_eq!(later[0].sequence_number(), "sequence-5");
        assert_eq!(later[1].sequence_number(), "sequence-6");
    }
}
