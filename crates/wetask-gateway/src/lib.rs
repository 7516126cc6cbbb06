//! WebSocket gateway for WeTask.
//!
//! This crate provides:
//! - The event hub: a single coordinating loop bridging the broker's
//!   `events` exchange to connected WebSocket clients
//! - Room membership and the client join/leave protocol
//! - The axum server exposing `/ws` and `/health`

pub mod client;
pub mod error;
pub mod hub;
pub mod rooms;
pub mod server;

pub use client::{Client, ClientMessage};
pub use error::GatewayError;
pub use hub::{Hub, HubHandle};
pub use server::{GatewayServer, GatewayState};

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
