//! Gateway HTTP bodies (status control, inbound replies, errors).

use serde::{Deserialize, Serialize};

/// `POST /status` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStatusParams {
    pub status: String,
}

/// `GET /status` and `POST /status` response. `previous` is only set by `POST`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
}

/// `POST /inbound` response: the generated reply, or null when suppressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundReply {
    pub reply: Option<String>,
}

/// Error body for non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
}

impl ErrorPayload {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
