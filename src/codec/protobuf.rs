use super::{CodecError, EnvelopeCodec};
use crate::envelope::UserIdRequest;
use prost::Message;

/// Wire schema:
///
/// ```proto
/// message UserIdRequest {
///   string user_id = 1;
///   string correlation_id = 2;
/// }
/// ```
#[derive(Clone, PartialEq, Message)]
pub struct UserIdRequestMessage {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(string, tag = "2")]
    pub correlation_id: String,
}

impl From<&UserIdRequest> for UserIdRequestMessage {
    fn from(request: &UserIdRequest) -> Self {
        Self {
            user_id: request.user_id.clone(),
            correlation_id: request.correlation_id.clone(),
        }
    }
}

impl From<UserIdRequestMessage> for UserIdRequest {
    fn from(message: UserIdRequestMessage) -> Self {
        UserIdRequest::new(message.user_id, message.correlation_id)
    }
}

/// Protocol Buffers encoding of [`UserIdRequest`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtobufCodec;

impl EnvelopeCodec for ProtobufCodec {
    fn name(&self) -> &'static str {
        "protobuf"
    }

    fn encode(&self, envelope: &UserIdRequest) -> Result<Vec<u8>, CodecError> {
        Ok(UserIdRequestMessage::from(envelope).encode_to_vec())
    }

    fn decode(&self, data: &[u8]) -> Result<UserIdRequest, CodecError> {
        UserIdRequestMessage::decode(data)
            .map(UserIdRequest::from)
            .map_err(|e| CodecError::Decode {
                codec: self.name(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_tags() {
        let bytes = ProtobufCodec
            .encode(&UserIdRequest::new("ab", "c"))
            .unwrap();
        // tag 1 / len 2 / "ab", tag 2 / len 1 / "c"
        assert_eq!(bytes, vec![0x0a, 0x02, b'a', b'b', 0x12, 0x01, b'c']);
    }

    #[test]
    fn test_decode_errors() {
        // Length prefix runs past the end of the buffer
        let err = ProtobufCodec.decode(&[0x0a, 0x05, b'a']).unwrap_err();
        assert!(matches!(err, CodecError::Decode { codec: "protobuf", .. }));

        // Invalid UTF-8 in a string field
        assert!(ProtobufCodec.decode(&[0x0a, 0x01, 0xff]).is_err());
    }

    #[test]
    fn test_empty_message_decodes_to_defaults() {
        let request = ProtobufCodec.decode(&[]).unwrap();
        assert_eq!(request, UserIdRequest::new("", ""));
    }
}
