//! The event hub.
//!
//! One coordinating loop owns the whole client registry and processes one
//! input at a time: a registration, an unregistration, or an inbound
//! broker event. No other task ever touches the registry, so it needs no
//! lock. Fan-out uses non-blocking sends; a slow client is evicted rather
//! than allowed to delay the others.

use crate::client::{Client, SendOutcome};
use crate::rooms::room_for_event;
use crate::Result;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wetask_broker::transport::{Delivery, QueueOptions};
use wetask_broker::Transport;
use wetask_core::events;

/// Handle for talking to the hub loop. Cheap to clone.
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::UnboundedSender<Arc<Client>>,
    unregister_tx: mpsc::UnboundedSender<u64>,
}

impl HubHandle {
    /// Register a client with the hub.
    pub fn register(&self, client: Arc<Client>) {
        let _ = self.register_tx.send(client);
    }

    /// Unregister a client. Safe to call more than once for the same
    /// client; removing an absent client is a no-op.
    pub fn unregister(&self, client_id: u64) {
        let _ = self.unregister_tx.send(client_id);
    }
}

/// The hub actor. Construct with [`Hub::connect`] (broker-backed) or
/// [`Hub::with_events`] (arbitrary delivery stream), then drive it with
/// [`Hub::run`] on its own task.
pub struct Hub {
    register_rx: mpsc::UnboundedReceiver<Arc<Client>>,
    unregister_rx: mpsc::UnboundedReceiver<u64>,
    events_rx: mpsc::Receiver<Delivery>,
}

impl Hub {
    /// Bind the durable events queue to every event routing key and start
    /// consuming it.
    pub async fn connect(transport: Arc<dyn Transport>) -> Result<(Self, HubHandle)> {
        transport.declare_exchange(events::EVENTS_EXCHANGE).await?;
        transport
            .declare_queue(events::EVENTS_QUEUE, QueueOptions::durable())
            .await?;
        for key in events::ALL {
            transport
                .bind_queue(events::EVENTS_QUEUE, events::EVENTS_EXCHANGE, key)
                .await?;
        }
        let events_rx = transport
            .consume(events::EVENTS_QUEUE, "gateway-events", false)
            .await?;
        info!("hub consuming '{}'", events::EVENTS_QUEUE);
        Ok(Self::with_events(events_rx))
    }

    /// Build a hub over an already-established delivery stream.
    pub fn with_events(events_rx: mpsc::Receiver<Delivery>) -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let hub = Self {
            register_rx,
            unregister_rx,
            events_rx,
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
        };
        (hub, handle)
    }

    /// Run the coordinating loop until every input channel closes.
    pub async fn run(mut self) {
        let mut clients: HashMap<u64, Arc<Client>> = HashMap::new();
        let mut events_open = true;

        loop {
            tokio::select! {
                registration = self.register_rx.recv() => {
                    let Some(client) = registration else { break };
                    debug!("hub registered client {}", client.id());
                    clients.insert(client.id(), client);
                }
                unregistration = self.unregister_rx.recv() => {
                    let Some(client_id) = unregistration else { break };
                    if let Some(client) = clients.remove(&client_id) {
                        client.close();
                        debug!("hub unregistered client {}", client_id);
                    }
                }
                delivery = self.events_rx.recv(), if events_open => {
                    match delivery {
                        Some(delivery) => Self::broadcast(&mut clients, delivery),
                        None => {
                            warn!("event stream closed; hub continues without broker events");
                            events_open = false;
                        }
                    }
                }
            }
        }

        for client in clients.values() {
            client.close();
        }
    }

    /// Fan one broker event out to every client in its room.
    fn broadcast(clients: &mut HashMap<u64, Arc<Client>>, delivery: Delivery) {
        let payload: serde_json::Value = match serde_json::from_slice(&delivery.body) {
            Ok(payload) => payload,
            Err(_) => {
                debug!("dropping undecodable event '{}'", delivery.routing_key);
                return;
            }
        };
        let Some(room) = room_for_event(&delivery.routing_key, &payload) else {
            debug!("event '{}' has no target room; dropped", delivery.routing_key);
            return;
        };

        let frame = json!({"type": delivery.routing_key, "data": payload}).to_string();

        let mut evicted = Vec::new();
        for (client_id, client) in clients.iter() {
            if !client.in_room(&room) {
                continue;
            }
            match client.try_send(&frame) {
                SendOutcome::Sent => {}
                SendOutcome::Full => {
                    warn!("client {} outbox full; evicting", client_id);
                    evicted.push(*client_id);
                }
                SendOutcome::Closed => evicted.push(*client_id),
            }
        }
        for client_id in evicted {
            if let Some(client) = clients.remove(&client_id) {
                client.close();
            }
        }
    }
}
