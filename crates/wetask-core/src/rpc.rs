//! The RPC reply envelope.
//!
//! Every service answers an RPC request with this shape. Correlation and
//! routing are broker-level message properties, never payload fields, so
//! the envelope carries only the outcome.

use serde::{Deserialize, Serialize};

/// Standard RPC response envelope.
///
/// Invariant: `success == true` implies `error` is absent; `success ==
/// false` implies `status_code` carries a caller-facing HTTP-style code
/// and `data` is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcResponse {
    /// Whether the operation succeeded.
    pub success: bool,

    /// Result payload (on success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Error message (on failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// HTTP-style status code (on failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            status_code: None,
        }
    }

    /// Create a failure response.
    pub fn fail(status_code: u16, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            status_code: Some(status_code),
        }
    }

    /// Invalid payload response (deserialization failure on the server).
    pub fn invalid_payload() -> Self {
        Self::fail(400, "Invalid payload")
    }

    /// Internal error response (recovered handler panic).
    pub fn internal_error() -> Self {
        Self::fail(500, "Internal server error")
    }
}
