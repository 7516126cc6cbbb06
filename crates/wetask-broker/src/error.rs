//! Broker error types.

use std::time::Duration;
use thiserror::Error;

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors that can occur in the broker layer.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Broker connection or channel could not be established.
    #[error("Broker unavailable: {0}")]
    TransportUnavailable(String),

    /// Broker rejected a declare/bind/cancel operation.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Publish was rejected or the connection dropped mid-publish.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Consumer registration failed.
    #[error("Consume failed: {0}")]
    Consume(String),

    /// No reply arrived within the deadline.
    #[error("RPC call to '{pattern}' timed out after {timeout:?}")]
    Timeout { pattern: String, timeout: Duration },

    /// Reply stream closed before a matching response arrived.
    #[error("Reply channel closed before a response arrived")]
    ReplyChannelClosed,

    /// Serialization or deserialization failure.
    #[error("Malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl BrokerError {
    /// Whether this error is an RPC timeout, as opposed to a transport
    /// fault or an answered failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
