//! The broker transport seam.
//!
//! Everything above this module (RPC client, server loop, event publisher,
//! gateway hub) talks to the broker exclusively through [`Transport`], so
//! the same protocol code runs against RabbitMQ in production and against
//! the in-process [`crate::MemoryTransport`] in tests.

use crate::Result;
use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

/// Content type carried by every request and reply body.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Message properties on the broker envelope.
///
/// Correlation and routing live here, never in the payload.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    /// MIME type of the body.
    pub content_type: Option<String>,

    /// Opaque token pairing a reply to its originating request.
    pub correlation_id: Option<String>,

    /// Queue the receiver should publish its response to.
    pub reply_to: Option<String>,
}

impl Properties {
    /// Properties for a JSON body.
    pub fn json() -> Self {
        Self {
            content_type: Some(CONTENT_TYPE_JSON.to_string()),
            ..Default::default()
        }
    }

    /// Set the correlation identifier.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Set the reply-to queue.
    pub fn with_reply_to(mut self, queue: impl Into<String>) -> Self {
        self.reply_to = Some(queue.into());
        self
    }
}

/// Queue declaration options.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueOptions {
    /// Survive broker restarts.
    pub durable: bool,

    /// Only this connection may consume.
    pub exclusive: bool,

    /// Delete once the last consumer is cancelled.
    pub auto_delete: bool,
}

impl QueueOptions {
    /// A durable, shared work queue (one per RPC pattern).
    pub fn durable() -> Self {
        Self {
            durable: true,
            ..Default::default()
        }
    }

    /// A private, broker-reclaimed reply queue (one per RPC call).
    pub fn reply() -> Self {
        Self {
            durable: false,
            exclusive: true,
            auto_delete: true,
        }
    }
}

/// Acknowledgment handle for a consumed delivery.
#[async_trait]
pub trait Ack: Send + Sync {
    /// Acknowledge the delivery.
    async fn ack(&self) -> Result<()>;
}

/// No-op acknowledgment, used by auto-ack consumers and the memory
/// transport.
pub struct NoopAck;

#[async_trait]
impl Ack for NoopAck {
    async fn ack(&self) -> Result<()> {
        Ok(())
    }
}

/// A message received from the broker.
pub struct Delivery {
    /// Routing key the message was published with.
    pub routing_key: String,

    /// Correlation identifier from the envelope, if any.
    pub correlation_id: Option<String>,

    /// Reply-to queue from the envelope, if any.
    pub reply_to: Option<String>,

    /// Raw message body.
    pub body: Vec<u8>,

    acker: Box<dyn Ack>,
}

impl Delivery {
    /// Create a delivery with no-op acknowledgment.
    pub fn new(routing_key: impl Into<String>, properties: Properties, body: Vec<u8>) -> Self {
        Self::with_acker(routing_key, properties, body, Box::new(NoopAck))
    }

    /// Create a delivery with an explicit acknowledgment handle.
    pub fn with_acker(
        routing_key: impl Into<String>,
        properties: Properties,
        body: Vec<u8>,
        acker: Box<dyn Ack>,
    ) -> Self {
        Self {
            routing_key: routing_key.into(),
            correlation_id: properties.correlation_id,
            reply_to: properties.reply_to,
            body,
            acker,
        }
    }

    /// Acknowledge the delivery.
    pub async fn ack(&self) -> Result<()> {
        self.acker.ack().await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("routing_key", &self.routing_key)
            .field("correlation_id", &self.correlation_id)
            .field("reply_to", &self.reply_to)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Connection/channel lifecycle wrapper around the message broker.
///
/// Implementations must be safe for unlimited concurrent use from multiple
/// tasks; callers never serialize access themselves.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Declare a queue, returning its name. An empty `name` asks the
    /// broker for a generated, anonymous name.
    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<String>;

    /// Declare a durable topic exchange.
    async fn declare_exchange(&self, name: &str) -> Result<()>;

    /// Bind a queue to a topic exchange under a routing key.
    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()>;

    /// Publish a message. An empty `exchange` targets the default exchange,
    /// where the routing key is a queue name.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: Properties,
        body: Vec<u8>,
    ) -> Result<()>;

    /// Register a consumer on a queue. The tag must be unique among the
    /// transport's active consumers. Deliveries arrive on the returned
    /// channel until the consumer is cancelled.
    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        manual_ack: bool,
    ) -> Result<mpsc::Receiver<Delivery>>;

    /// Cancel a consumer by tag.
    async fn cancel(&self, consumer_tag: &str) -> Result<()>;
}
