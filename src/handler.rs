//! Handlers that decode record payloads into envelopes

use crate::codec::EnvelopeCodec;
use crate::envelope::UserIdRequest;
use crate::error::ProcessingError;
use crate::tailer::RecordHandler;
use async_trait::async_trait;
use aws_sdk_kinesis::types::Record;
use aws_smithy_types_convert::date_time::DateTimeExt;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Record metadata passed along with a decoded envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMeta {
    pub sequence_number: String,
    pub partition_key: String,
    pub approximate_arrival: Option<DateTime<Utc>>,
}

impl From<&Record> for RecordMeta {
    fn from(record: &Record) -> Self {
        Self {
            sequence_number: record.sequence_number().to_string(),
            partition_key: record.partition_key().to_string(),
            approximate_arrival: record
                .approximate_arrival_timestamp()
                .and_then(|ts| ts.to_chrono_utc().ok()),
        }
    }
}

/// Receives envelopes that decoded successfully
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    async fn handle_envelope(
        &self,
        envelope: UserIdRequest,
        meta: RecordMeta,
    ) -> Result<(), ProcessingError>;
}

/// Decodes each record with the supplied codec before handing it on
///
/// A payload that fails to decode is reported as a hard failure for that
/// record only.
pub struct DecodingHandler<H> {
    codec: Arc<dyn EnvelopeCodec>,
    inner: H,
}

impl<H: EnvelopeHandler> DecodingHandler<H> {
    pub fn new(codec: Arc<dyn EnvelopeCodec>, inner: H) -> Self {
        Self { codec, inner }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

#[async_trait]
impl<H: EnvelopeHandler> RecordHandler for DecodingHandler<H> {
    async fn handle_record(&self, record: &Record) -> Result<(), ProcessingError> {
        let envelope = match self.codec.decode(record.data().as_ref()) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    sequence = %record.sequence_number(),
                    codec = self.codec.name(),
                    error = %e,
                    "Failed to decode record"
                );
                return Err(ProcessingError::hard(e));
            }
        };

        debug!(
            sequence = %record.sequence_number(),
            codec = self.codec.name(),
            "Decoded record"
        );

        self.inner
            .handle_envelope(envelope, RecordMeta::from(record))
            .await
    }
}

/// Logs every envelope it receives
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEnvelopeHandler;

#[async_trait]
impl EnvelopeHandler for LoggingEnvelopeHandler {
    async fn handle_envelope(
        &self,
        envelope: UserIdRequest,
        meta: RecordMeta,
    ) -> Result<(), ProcessingError> {
        info!(
            user_id = %envelope.user_id,
            correlation_id = %envelope.correlation_id,
            sequence = %meta.sequence_number,
            partition_key = %meta.partition_key,
            arrival = ?meta.approximate_arrival,
            "Received record"
        );
        Ok(())
    }
}
