//! RPC server dispatch loop.
//!
//! One loop per pattern: a durable, shared queue consumed with manual
//! acknowledgment, so a crash mid-handler redelivers instead of silently
//! losing the message. Handler panics are contained and answered with a
//! 500 envelope; the loop keeps serving.

use crate::transport::{Delivery, Properties, QueueOptions, Transport};
use crate::Result;
use async_trait::async_trait;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use wetask_core::RpcResponse;

/// Handler for one RPC pattern.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    /// Handle a decoded request payload.
    async fn handle(&self, payload: serde_json::Value) -> RpcResponse;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> RpcHandler for FnHandler<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = RpcResponse> + Send,
{
    async fn handle(&self, payload: serde_json::Value) -> RpcResponse {
        (self.0)(payload).await
    }
}

/// Wrap an async closure as an [`RpcHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn RpcHandler>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResponse> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Per-service RPC dispatcher.
#[derive(Clone)]
pub struct RpcServer {
    transport: Arc<dyn Transport>,
}

impl RpcServer {
    /// Create a server over a transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Run one pattern's loop on its own task.
    pub fn spawn(&self, pattern: &str, handler: Arc<dyn RpcHandler>) -> JoinHandle<()> {
        let server = self.clone();
        let pattern = pattern.to_string();
        tokio::spawn(async move {
            if let Err(e) = server.serve(&pattern, handler).await {
                error!("RPC loop for '{}' terminated: {}", pattern, e);
            }
        })
    }

    /// Serve a pattern until the consumer stream closes.
    ///
    /// Declares the pattern's durable queue (shared by every instance of
    /// the service, so the broker load-balances deliveries) and processes
    /// deliveries one at a time.
    pub async fn serve(&self, pattern: &str, handler: Arc<dyn RpcHandler>) -> Result<()> {
        self.transport
            .declare_queue(pattern, QueueOptions::durable())
            .await?;
        let consumer_tag = format!("srv-{}-{}", pattern, Uuid::new_v4());
        let mut deliveries = self.transport.consume(pattern, &consumer_tag, true).await?;
        info!("serving RPC pattern '{}'", pattern);

        while let Some(delivery) = deliveries.recv().await {
            self.dispatch(pattern, handler.as_ref(), delivery).await;
        }
        Ok(())
    }

    async fn dispatch(&self, pattern: &str, handler: &dyn RpcHandler, delivery: Delivery) {
        let response = match serde_json::from_slice::<serde_json::Value>(&delivery.body) {
            Err(_) => RpcResponse::invalid_payload(),
            Ok(payload) => {
                match AssertUnwindSafe(handler.handle(payload)).catch_unwind().await {
                    Ok(response) => response,
                    Err(_) => {
                        error!("handler for '{}' panicked", pattern);
                        RpcResponse::internal_error()
                    }
                }
            }
        };

        // Ack regardless of handler outcome: the handler ran exactly once
        // for this delivery, whatever it produced.
        if let Err(e) = delivery.ack().await {
            warn!("failed to ack delivery on '{}': {}", pattern, e);
        }

        let Some(reply_to) = delivery.reply_to.as_deref() else {
            debug!("delivery on '{}' carries no reply-to; dropping response", pattern);
            return;
        };

        let mut properties = Properties::json();
        if let Some(correlation_id) = &delivery.correlation_id {
            // Echoed back unchanged; the caller matches on it.
            properties = properties.with_correlation_id(correlation_id);
        }
        let body = match serde_json::to_vec(&response) {
            Ok(body) => body,
            Err(e) => {
                error!("failed to encode response for '{}': {}", pattern, e);
                return;
            }
        };
        if let Err(e) = self.transport.publish("", reply_to, properties, body).await {
            warn!("failed to publish reply for '{}': {}", pattern, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryTransport, RpcClient};
    use serde_json::json;
    use std::time::Duration;

    /// Declare the pattern queue up front so a publish that races the
    /// spawned loop's own declaration is buffered, not dropped.
    async fn declare(transport: &MemoryTransport, pattern: &str) {
        transport
            .declare_queue(pattern, QueueOptions::durable())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_serve_answers_calls() {
        let transport = Arc::new(MemoryTransport::new());
        declare(&transport, "users.getById").await;
        let server = RpcServer::new(transport.clone());
        server.spawn(
            "users.getById",
            handler_fn(|payload| async move {
                let id = payload.get("id").and_then(|v| v.as_u64()).unwrap_or(0);
                RpcResponse::ok(json!({"id": id, "name": "ada"}))
            }),
        );

        let client = RpcClient::new(transport);
        let response = client.call("users.getById", &json!({"id": 3})).await.unwrap();
        assert!(response.success);
        assert_eq!(response.data, Some(json!({"id": 3, "name": "ada"})));
    }

    #[tokio::test]
    async fn test_invalid_payload_yields_400() {
        let transport = Arc::new(MemoryTransport::new());
        declare(&transport, "strict").await;
        let server = RpcServer::new(transport.clone());
        server.spawn(
            "strict",
            handler_fn(|_| async { RpcResponse::ok(json!(null)) }),
        );

        // Bypass the client to publish a body that is not JSON.
        let reply_queue = transport.declare_queue("", QueueOptions::reply()).await.unwrap();
        let mut replies = transport.consume(&reply_queue, "probe", false).await.unwrap();
        transport
            .publish(
                "",
                "strict",
                Properties::json()
                    .with_correlation_id("c1")
                    .with_reply_to(&reply_queue),
                b"{{{{".to_vec(),
            )
            .await
            .unwrap();

        let delivery = tokio::time::timeout(Duration::from_secs(1), replies.recv())
            .await
            .unwrap()
            .unwrap();
        let response: RpcResponse = serde_json::from_slice(&delivery.body).unwrap();
        assert!(!response.success);
        assert_eq!(response.status_code, Some(400));
        assert_eq!(response.error.as_deref(), Some("Invalid payload"));
    }

    #[tokio::test]
    async fn test_panicking_handler_answers_500_and_loop_survives() {
        let transport = Arc::new(MemoryTransport::new());
        declare(&transport, "flaky").await;
        let server = RpcServer::new(transport.clone());
        server.spawn(
            "flaky",
            handler_fn(|payload| async move {
                if payload.get("boom").is_some() {
                    panic!("handler exploded");
                }
                RpcResponse::ok(json!("fine"))
            }),
        );

        let client = RpcClient::new(transport);

        let first = client.call("flaky", &json!({"boom": true})).await.unwrap();
        assert!(!first.success);
        assert_eq!(first.status_code, Some(500));

        // The loop must still be alive for the next delivery.
        let second = client.call("flaky", &json!({})).await.unwrap();
        assert!(second.success);
        assert_eq!(second.data, Some(json!("fine")));
    }

    #[tokio::test]
    async fn test_delivery_without_reply_to_is_dropped() {
        let transport = Arc::new(MemoryTransport::new());
        declare(&transport, "oneway").await;
        let server = RpcServer::new(transport.clone());
        server.spawn(
            "oneway",
            handler_fn(|_| async { RpcResponse::ok(json!(null)) }),
        );

        // Fire-and-forget publish straight at the pattern queue; the loop
        // must process it without erroring out.
        transport
            .publish("", "oneway", Properties::json(), b"{}".to_vec())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Still answering afterwards.
        let client = RpcClient::new(transport);
        assert!(client.call("oneway", &json!({})).await.unwrap().success);
    }
}
