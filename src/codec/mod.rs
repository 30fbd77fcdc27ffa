//! Envelope encodings
//!
//! Two interchangeable strategies are provided: [`JsonCodec`], a
//! self-describing text encoding, and [`ProtobufCodec`], a fixed-schema binary
//! encoding. The caller picks one; the tailer never does.

mod json;
mod protobuf;

pub use json::JsonCodec;
pub use protobuf::{ProtobufCodec, UserIdRequestMessage};

use crate::envelope::UserIdRequest;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("{codec} encode failed: {reason}")]
    Encode { codec: &'static str, reason: String },

    #[error("{codec} decode failed: {reason}")]
    Decode { codec: &'static str, reason: String },
}

/// Converts envelopes to record payloads and back
pub trait EnvelopeCodec: Send + Sync {
    fn name(&self) -> &'static str;

    fn encode(&self, envelope: &UserIdRequest) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, data: &[u8]) -> Result<UserIdRequest, CodecError>;
}

/// Encoding selector exposed to configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Json,
    Protobuf,
}

impl Encoding {
    pub fn codec(self) -> Arc<dyn EnvelopeCodec> {
        match self {
            Encoding::Json => Arc::new(JsonCodec),
            Encoding::Protobuf => Arc::new(ProtobufCodec),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Json => f.write_str("json"),
            Encoding::Protobuf => f.write_str("protobuf"),
        }
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Encoding::Json),
            "protobuf" | "proto" => Ok(Encoding::Protobuf),
            other => Err(format!("unknown encoding '{}', expected json or protobuf", other)),
        }
    }
}
