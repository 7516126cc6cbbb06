//! WebSocket gateway server.

use crate::client::{Client, ClientMessage};
use crate::hub::HubHandle;
use crate::{GatewayError, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};
use wetask_core::config::GatewayConfig;

/// Shared server state.
pub struct GatewayState {
    /// Handle to the hub's coordinating loop.
    pub hub: HubHandle,

    /// Monotonic client id source.
    next_client_id: AtomicU64,
}

impl GatewayState {
    fn next_client_id(&self) -> u64 {
        self.next_client_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// The WebSocket gateway server.
pub struct GatewayServer {
    state: Arc<GatewayState>,
    config: GatewayConfig,
}

impl GatewayServer {
    /// Create a server wired to a hub.
    pub fn new(config: GatewayConfig, hub: HubHandle) -> Self {
        let state = Arc::new(GatewayState {
            hub,
            next_client_id: AtomicU64::new(1),
        });
        Self { state, config }
    }

    /// Create the axum router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .with_state(self.state.clone())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve until the process exits.
    pub async fn run(&self) -> Result<()> {
        let addr = self.bind_address();
        info!("gateway listening on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(GatewayError::Io)?;
        axum::serve(listener, self.router())
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        Ok(())
    }

    fn bind_address(&self) -> SocketAddr {
        let ip = if self.config.bind_all {
            [0, 0, 0, 0]
        } else {
            [127, 0, 0, 1]
        };
        SocketAddr::from((ip, self.config.port))
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// WebSocket upgrade handler. Any upgrade is accepted; room membership is
/// the only scoping a client gets.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one client connection: register with the hub, spawn the write
/// pump, and run the read pump inline until the socket goes away.
async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>) {
    let client_id = state.next_client_id();
    let (client, outbox_rx) = Client::new(client_id);
    state.hub.register(client.clone());
    info!("client {} connected", client_id);

    let (sender, mut receiver) = socket.split();
    let mut write_task = tokio::spawn(write_pump(sender, outbox_rx));

    // Read pump. Join/leave messages mutate only this client's own room
    // set; the hub reads it at broadcast time. A finished write pump means
    // the outbox was closed (unregistration or eviction), so the
    // connection is torn down here too rather than waiting on a peer that
    // may never answer the close frame.
    loop {
        tokio::select! {
            _ = &mut write_task => {
                debug!("client {} outbox closed; dropping connection", client_id);
                break;
            }
            message = receiver.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(message) => message.apply(&client),
                        Err(_) => debug!("client {} sent malformed message; ignored", client_id),
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    debug!("client {} closed connection", client_id);
                    break;
                }
                Some(Err(e)) => {
                    debug!("client {} read error: {}", client_id, e);
                    break;
                }
                None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    // The hub makes unregistration idempotent, so it does not matter
    // whether this read-pump exit or a slow-consumer eviction got here
    // first.
    state.hub.unregister(client_id);
    if !write_task.is_finished() {
        let _ = write_task.await;
    }
    info!("client {} disconnected", client_id);
}

/// Drain the outbox to the socket. A closed outbox is the cancellation
/// signal: send a close frame and exit.
async fn write_pump(mut sender: SplitSink<WebSocket, Message>, mut outbox: mpsc::Receiver<String>) {
    while let Some(frame) = outbox.recv().await {
        if sender.send(Message::Text(frame)).await.is_err() {
            return;
        }
    }
    let _ = sender.send(Message::Close(None)).await;
}
