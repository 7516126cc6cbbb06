//! Fire-and-forget event publishing.
//!
//! Services publish an event after a mutation commits. Delivery is
//! best-effort: a failure is logged and surfaced, but never retried and
//! never rolls back the mutation it reports.

use crate::transport::{Properties, Transport};
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use wetask_core::events;

/// Publisher for the shared `events` topic exchange.
#[derive(Clone)]
pub struct EventPublisher {
    transport: Arc<dyn Transport>,
}

impl EventPublisher {
    /// Create a publisher, declaring the topic exchange.
    pub async fn new(transport: Arc<dyn Transport>) -> Result<Self> {
        transport.declare_exchange(events::EVENTS_EXCHANGE).await?;
        Ok(Self { transport })
    }

    /// Publish one event with its type as the routing key.
    pub async fn publish<P>(&self, event: &str, payload: &P) -> Result<()>
    where
        P: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(payload)?;
        match self
            .transport
            .publish(events::EVENTS_EXCHANGE, event, Properties::json(), body)
            .await
        {
            Ok(()) => {
                debug!("published event '{}'", event);
                Ok(())
            }
            Err(e) => {
                warn!("event publish '{}' failed: {}", event, e);
                Err(e)
            }
        }
    }
}
