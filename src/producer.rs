//! Single-record producer
//!
//! Every call to [`Producer::put`] issues exactly one PutRecord; there is no
//! batching and failures are returned to the caller without retrying.

use crate::client::{KinesisClientTrait, PutAck};
use crate::codec::EnvelopeCodec;
use crate::envelope::UserIdRequest;
use crate::error::ProducerError;
use std::sync::Arc;
use tracing::{debug, error, instrument};

pub struct Producer<C: KinesisClientTrait> {
    client: Arc<C>,
    stream_name: String,
}

impl<C: KinesisClientTrait> Producer<C> {
    pub fn new(client: C, stream_name: impl Into<String>) -> Self {
        Self {
            client: Arc::new(client),
            stream_name: stream_name.into(),
        }
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Append one record to the stream
    ///
    /// Empty payloads and partition keys are rejected before calling the
    /// service; the maximum record size is left to the service to enforce.
    #[instrument(skip(self, payload), fields(stream = %self.stream_name, bytes = payload.len()))]
    pub async fn put(&self, payload: &[u8], partition_key: &str) -> Result<PutAck, ProducerError> {
        if payload.is_empty() {
            return Err(ProducerError::InvalidRecord("payload is empty".to_string()));
        }
        if partition_key.is_empty() {
            return Err(ProducerError::InvalidRecord(
                "partition key is empty".to_string(),
            ));
        }

        match self
            .client
            .put_record(&self.stream_name, partition_key, payload)
            .await
        {
            Ok(ack) => {
                debug!(
                    shard_id = %ack.shard_id,
                    sequence = %ack.sequence_number,
                    "Record submitted"
                );
                Ok(ack)
            }
            Err(source) => {
                error!(error = %source, "Put record failed");
                Err(ProducerError::SubmissionFailed {
                    stream: self.stream_name.clone(),
                    source,
                })
            }
        }
    }

    /// Encode `envelope` with `codec` and put it
    pub async fn put_envelope(
        &self,
        envelope: &UserIdRequest,
        codec: &dyn EnvelopeCodec,
        partition_key: &str,
    ) -> Result<PutAck, ProducerError> {
        let payload = codec.encode(envelope)?;
        debug!(
            codec = codec.name(),
            correlation_id = %envelope.correlation_id,
            "Encoded envelope"
        );
        self.put(&payload, partition_key).await
    }
}
