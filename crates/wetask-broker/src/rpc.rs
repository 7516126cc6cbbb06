//! RPC client.
//!
//! Each call declares its own private, broker-reclaimed reply queue, so
//! concurrent callers never share a correlation table: the reply inbox is
//! per call, the correlation identifier is checked anyway, and the
//! consumer is cancelled on every exit path.

use crate::transport::{Properties, QueueOptions, Transport};
use crate::{BrokerError, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;
use wetask_core::RpcResponse;

/// Default deadline for a call with no explicit timeout.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for synchronous request/reply over the broker.
///
/// Cheap to clone; all clones share the underlying transport. Safe for
/// unlimited concurrent callers.
#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl RpcClient {
    /// Create a client with the default 5 second deadline.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    /// Override the default deadline for calls made through this client.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Call a pattern and wait for its reply.
    pub async fn call<P>(&self, pattern: &str, payload: &P) -> Result<RpcResponse>
    where
        P: Serialize + ?Sized,
    {
        self.call_with_timeout(pattern, payload, self.timeout).await
    }

    /// Call a pattern with an explicit per-call deadline.
    pub async fn call_with_timeout<P>(
        &self,
        pattern: &str,
        payload: &P,
        timeout: Duration,
    ) -> Result<RpcResponse>
    where
        P: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(payload)?;

        // Private reply inbox for this call only. Auto-delete hands the
        // queue back to the broker once the consumer is cancelled.
        let reply_queue = self
            .transport
            .declare_queue("", QueueOptions::reply())
            .await?;
        let consumer_tag = format!("rpc-{}", Uuid::new_v4());
        let mut replies = self
            .transport
            .consume(&reply_queue, &consumer_tag, false)
            .await?;

        let correlation_id = Uuid::new_v4().to_string();
        debug!(
            "rpc call pattern={} correlation_id={} reply_queue={}",
            pattern, correlation_id, reply_queue
        );

        let result = self
            .exchange(pattern, body, &reply_queue, &correlation_id, timeout, &mut replies)
            .await;

        // Cancel on success, timeout, and failure alike; a leaked consumer
        // would pin the auto-delete queue on the broker.
        if let Err(e) = self.transport.cancel(&consumer_tag).await {
            warn!("failed to cancel reply consumer '{}': {}", consumer_tag, e);
        }
        result
    }

    async fn exchange(
        &self,
        pattern: &str,
        body: Vec<u8>,
        reply_queue: &str,
        correlation_id: &str,
        timeout: Duration,
        replies: &mut mpsc::Receiver<crate::transport::Delivery>,
    ) -> Result<RpcResponse> {
        let properties = Properties::json()
            .with_correlation_id(correlation_id)
            .with_reply_to(reply_queue);
        self.transport.publish("", pattern, properties, body).await?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let delivery = match tokio::time::timeout_at(deadline, replies.recv()).await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => return Err(BrokerError::ReplyChannelClosed),
                Err(_) => {
                    return Err(BrokerError::Timeout {
                        pattern: pattern.to_string(),
                        timeout,
                    })
                }
            };

            // The queue is private to this call, so a mismatch should not
            // happen; checking costs nothing and stray deliveries are
            // simply skipped.
            if delivery.correlation_id.as_deref() != Some(correlation_id) {
                debug!(
                    "discarding reply with foreign correlation id {:?}",
                    delivery.correlation_id
                );
                continue;
            }

            return Ok(serde_json::from_slice(&delivery.body)?);
        }
    }
}
