//! Error types for the shard tailer and producer

use crate::client::KinesisClientError;
use crate::codec::CodecError;
use thiserror::Error;
use tokio::task::JoinError;

/// Main error type for tailer operations
///
/// Setup failures (`DescribeFailed`, `NoShards`, `ShardNotFound`,
/// `IteratorFailed`) are fatal for the run and are never retried.
#[derive(Debug, Error)]
pub enum TailerError {
    #[error("Failed to describe stream {stream}: {source}")]
    DescribeFailed {
        stream: String,
        #[source]
        source: KinesisClientError,
    },

    #[error("Stream {0} has no shards")]
    NoShards(String),

    #[error("Shard {shard_id} not found in stream {stream}")]
    ShardNotFound { stream: String, shard_id: String },

    #[error("Failed to get iterator for shard {shard_id}: {source}")]
    IteratorFailed {
        shard_id: String,
        #[source]
        source: KinesisClientError,
    },

    #[error("Polling shard {shard_id} failed after {attempts} consecutive attempts: {source}")]
    PollFailed {
        shard_id: String,
        attempts: u32,
        #[source]
        source: KinesisClientError,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TailerError {
    /// Whether the error happened before the first poll
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            TailerError::DescribeFailed { .. }
                | TailerError::NoShards(_)
                | TailerError::ShardNotFound { .. }
                | TailerError::IteratorFailed { .. }
        )
    }

    /// Shard the error refers to, when one was known
    pub fn shard_id(&self) -> Option<&str> {
        match self {
            TailerError::ShardNotFound { shard_id, .. }
            | TailerError::IteratorFailed { shard_id, .. }
            | TailerError::PollFailed { shard_id, .. } => Some(shard_id),
            _ => None,
        }
    }
}

impl From<JoinError> for TailerError {
    fn from(err: JoinError) -> Self {
        TailerError::Other(err.into())
    }
}

/// Result type for tailer operations
pub type Result<T> = std::result::Result<T, TailerError>;

/// Error type for producer operations
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Failed to submit record to stream {stream}: {source}")]
    SubmissionFailed {
        stream: String,
        #[source]
        source: KinesisClientError,
    },

    #[error(transparent)]
    Encode(#[from] CodecError),
}

/// Error returned by record handlers
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Soft failure (retriable): {0}")]
    SoftFailure(#[source] anyhow::Error),

    #[error("Hard failure (non-retriable): {0}")]
    HardFailure(#[source] anyhow::Error),
}

impl ProcessingError {
    pub fn soft(err: impl Into<anyhow::Error>) -> Self {
        ProcessingError::SoftFailure(err.into())
    }

    pub fn hard(err: impl Into<anyhow::Error>) -> Self {
        ProcessingError::HardFailure(err.into())
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, ProcessingError::SoftFailure(_))
    }
}
