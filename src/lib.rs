//! Kinesis Tail - publish records to an AWS Kinesis stream and follow a shard
//!
//! The crate has two halves:
//!
//! - [`Producer`] appends single records to a stream
//! - [`ShardTailer`] opens an iterator on one shard and hands every record to
//!   a [`RecordHandler`] in order, until the shard closes or shutdown is
//!   requested
//!
//! Payloads are usually [`UserIdRequest`] envelopes encoded with one of the
//! [`codec`] strategies; [`DecodingHandler`] decodes them on the way out.

pub mod client;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod monitoring;
pub mod producer;
pub mod retry;
pub mod tailer;

// Make test utilities available for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test;

#[cfg(test)]
mod tests;

pub use client::{KinesisClientError, KinesisClientTrait, PutAck, StreamDescriptor};
pub use codec::{Encoding, EnvelopeCodec, JsonCodec, ProtobufCodec};
pub use envelope::UserIdRequest;
pub use error::{ProcessingError, ProducerError, Result, TailerError};
pub use handler::{DecodingHandler, EnvelopeHandler, LoggingEnvelopeHandler, RecordMeta};
pub use producer::Producer;
pub use retry::{ExponentialBackoff, PollRetryPolicy};
pub use tailer::{
    DeadLetter, RecordHandler, ShardTailer, StartPosition, TailSummary, TailerConfig, TailerState,
    TerminationReason,
};
