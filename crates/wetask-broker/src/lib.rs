//! # wetask-broker
//!
//! Synchronous request/reply over an asynchronous message broker, plus
//! fire-and-forget event publishing.
//!
//! This crate provides:
//! - A [`Transport`] seam over the broker (declare, publish, consume, cancel)
//!   with an AMQP implementation ([`AmqpTransport`]) and an in-process one
//!   ([`MemoryTransport`]) for tests and local runs
//! - [`RpcClient`]: blocking-style calls with private per-call reply queues,
//!   correlation identifiers, and a deadline
//! - [`RpcServer`]: one durable-queue dispatch loop per pattern, with manual
//!   acknowledgment and panic isolation
//! - [`EventPublisher`]: best-effort publishes to the shared topic exchange

pub mod amqp;
pub mod error;
pub mod memory;
pub mod publisher;
pub mod rpc;
pub mod serve;
pub mod transport;

pub use amqp::AmqpTransport;
pub use error::{BrokerError, Result};
pub use memory::MemoryTransport;
pub use publisher::EventPublisher;
pub use rpc::{RpcClient, DEFAULT_RPC_TIMEOUT};
pub use serve::{handler_fn, RpcHandler, RpcServer};
pub use transport::{Ack, Delivery, Properties, QueueOptions, Transport};
