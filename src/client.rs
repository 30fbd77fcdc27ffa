//! Seam between the tailer/producer and the Kinesis service
//!
//! [`KinesisClientTrait`] is implemented for the SDK [`Client`] and for the
//! test doubles behind the `test-utils` feature.

use async_trait::async_trait;
use aws_sdk_kinesis::{
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::Blob,
    types::{Record, ShardIteratorType},
    Client,
};
use chrono::{DateTime, Utc};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{instrument, trace};

/// Classified failure of a Kinesis API call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KinesisClientError {
    #[error("Iterator expired")]
    ExpiredIterator,

    #[error("Throughput exceeded")]
    ThroughputExceeded,

    #[error("Access denied")]
    AccessDenied,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("KMS error: {0}")]
    KmsError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("{0}")]
    Other(String),
}

impl KinesisClientError {
    /// Errors that will not go away by asking again
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            KinesisClientError::AccessDenied
                | KinesisClientError::InvalidArgument(_)
                | KinesisClientError::ResourceNotFound(_)
                | KinesisClientError::KmsError(_)
        )
    }

    pub fn is_throttling(&self) -> bool {
        matches!(self, KinesisClientError::ThroughputExceeded)
    }

    fn from_code(code: &str, message: String) -> Self {
        match code {
            "ExpiredIteratorException" => KinesisClientError::ExpiredIterator,
            "ProvisionedThroughputExceededException"
            | "LimitExceededException"
            | "ThrottlingException"
            | "KMSThrottlingException" => KinesisClientError::ThroughputExceeded,
            "AccessDeniedException" => KinesisClientError::AccessDenied,
            "InvalidArgumentException" => KinesisClientError::InvalidArgument(message),
            "ResourceNotFoundException" => KinesisClientError::ResourceNotFound(message),
            c if c.starts_with("KMS") => KinesisClientError::KmsError(message),
            c => KinesisClientError::Other(format!("{}: {}", c, message)),
        }
    }
}

impl<E, R> From<SdkError<E, R>> for KinesisClientError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    fn from(err: SdkError<E, R>) -> Self {
        let detail = DisplayErrorContext(&err).to_string();
        match &err {
            SdkError::TimeoutError(_) => KinesisClientError::Timeout(detail),
            SdkError::DispatchFailure(_) => KinesisClientError::ConnectionError(detail),
            _ => match err.code() {
                Some(code) => {
                    let message = err.message().unwrap_or_default().to_string();
                    KinesisClientError::from_code(code, message)
                }
                None => KinesisClientError::Other(detail),
            },
        }
    }
}

/// Shards of a stream as seen at tailer start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub stream_name: String,
    pub shards: Vec<String>,
}

impl StreamDescriptor {
    pub fn first_shard(&self) -> Option<&str> {
        self.shards.first().map(String::as_str)
    }

    pub fn contains(&self, shard_id: &str) -> bool {
        self.shards.iter().any(|s| s == shard_id)
    }
}

/// Response of one GetRecords call
#[derive(Debug, Clone, Default)]
pub struct PollOutput {
    pub records: Vec<Record>,
    /// `None` once the shard is closed and fully read
    pub next_iterator: Option<String>,
    pub millis_behind_latest: Option<i64>,
}

/// Acknowledgment of a PutRecord call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutAck {
    pub shard_id: String,
    pub sequence_number: String,
}

#[async_trait]
pub trait KinesisClientTrait: Send + Sync {
    async fn describe_stream(
        &self,
        stream_name: &str,
    ) -> Result<StreamDescriptor, KinesisClientError>;

    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
        iterator_type: ShardIteratorType,
        sequence_number: Option<&str>,
        timestamp: Option<&DateTime<Utc>>,
    ) -> Result<String, KinesisClientError>;

    async fn get_records(&self, iterator: &str, limit: i32)
        -> Result<PollOutput, KinesisClientError>;

    async fn put_record(
        &self,
        stream_name: &str,
        partition_key: &str,
        data: &[u8],
    ) -> Result<PutAck, KinesisClientError>;
}

#[async_trait]
impl KinesisClientTrait for Client {
    #[instrument(skip(self))]
    async fn describe_stream(
        &self,
        stream_name: &str,
    ) -> Result<StreamDescriptor, KinesisClientError> {
        let mut shards = Vec::new();
        let mut next_token: Option<String> = None;

        // ListShards rejects StreamName together with NextToken
        loop {
            let request = match &next_token {
                Some(token) => self.list_shards().next_token(token),
                None => self.list_shards().stream_name(stream_name),
            };
            let response = request.send().await?;

            shards.extend(response.shards().iter().map(|s| s.shard_id().to_string()));

            next_token = response.next_token().map(String::from);
            if next_token.is_none() {
                break;
            }
        }

        trace!(stream = %stream_name, shard_count = shards.len(), "Listed shards");

        Ok(StreamDescriptor {
            stream_name: stream_name.to_string(),
            shards,
        })
    }

    #[instrument(skip(self, timestamp))]
    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
        iterator_type: ShardIteratorType,
        sequence_number: Option<&str>,
        timestamp: Option<&DateTime<Utc>>,
    ) -> Result<String, KinesisClientError> {
        let mut req = self
            .get_shard_iterator()
            .stream_name(stream_name)
            .shard_id(shard_id)
            .shard_iterator_type(iterator_type);

        if let Some(seq) = sequence_number {
            req = req.starting_sequence_number(seq);
        }

        if let Some(ts) = timestamp {
            let system_time: SystemTime = (*ts).into();
            req = req.timestamp(aws_smithy_types::DateTime::from(system_time));
        }

        let response = req.send().await?;
        response
            .shard_iterator
            .filter(|it| !it.is_empty())
            .ok_or_else(|| KinesisClientError::Other("No shard iterator returned".to_string()))
    }

    async fn get_records(
        &self,
        iterator: &str,
        limit: i32,
    ) -> Result<PollOutput, KinesisClientError> {
        let response = self
            .get_records()
            .shard_iterator(iterator)
            .limit(limit)
            .send()
            .await?;

        Ok(PollOutput {
            records: response.records().to_vec(),
            next_iterator: response.next_shard_iterator().map(String::from),
            millis_behind_latest: response.millis_behind_latest(),
        })
    }

    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn put_record(
        &self,
        stream_name: &str,
        partition_key: &str,
        data: &[u8],
    ) -> Result<PutAck, KinesisClientError> {
        let response = self
            .put_record()
            .stream_name(stream_name)
            .partition_key(partition_key)
            .data(Blob::new(data.to_vec()))
            .send()
            .await?;

        Ok(PutAck {
            shard_id: response.shard_id().to_string(),
            sequence_number: response.sequence_number().to_string(),
        })
    }
}
