use super::{CodecError, EnvelopeCodec};
use crate::envelope::UserIdRequest;

/// JSON encoding with `UserID`/`CorrelationID` field names
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl EnvelopeCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, envelope: &UserIdRequest) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(envelope).map_err(|e| CodecError::Encode {
            codec: self.name(),
            reason: e.to_string(),
        })
    }

    fn decode(&self, data: &[u8]) -> Result<UserIdRequest, CodecError> {
        serde_json::from_slice(data).map_err(|e| CodecError::Decode {
            codec: self.name(),
            reason: e.to_string(),
        })
    }
}
