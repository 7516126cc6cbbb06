//! # wetask-core
//!
//! Shared vocabulary for the WeTask backend services:
//!
//! - **Wire types**: the `RpcResponse` envelope every service replies with
//! - **Patterns**: the RPC queue names and event routing keys
//! - **Configuration**: environment-driven broker and gateway settings

pub mod config;
pub mod env;
pub mod error;
pub mod events;
pub mod patterns;
pub mod rpc;

// Re-exports for convenience
pub use config::{BrokerConfig, GatewayConfig};
pub use error::{Error, Result};
pub use rpc::RpcResponse;
