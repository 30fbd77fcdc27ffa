//! Application payload carried in each record

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request identifying a user, correlated across producer and consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdRequest {
    #[serde(rename = "UserID")]
    pub user_id: String,
    #[serde(rename = "CorrelationID")]
    pub correlation_id: String,
}

impl UserIdRequest {
    pub fn new(user_id: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            correlation_id: correlation_id.into(),
        }
    }

    /// Fresh request with random v4 identifiers
    pub fn random() -> Self {
        Self::new(Uuid::new_v4().to_string(), Uuid::new_v4().to_string())
    }
}
