//! Gateway error types.

use thiserror::Error;

/// Errors that can occur in the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Broker error.
    #[error("Broker error: {0}")]
    Broker(#[from] wetask_broker::BrokerError),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}
