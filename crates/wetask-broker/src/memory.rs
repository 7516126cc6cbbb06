//! In-process broker transport.
//!
//! Implements the same queue/exchange semantics the AMQP transport
//! provides, entirely in memory: named and anonymous queues, auto-delete
//! on last consumer cancel, a topic exchange with per-key bindings, and
//! round-robin delivery among a queue's consumers. Used by the test suite
//! and handy for single-process local runs.

use crate::transport::{Delivery, Properties, QueueOptions, Transport};
use crate::{BrokerError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Per-consumer delivery channel capacity.
const CONSUMER_BUFFER: usize = 64;

struct Consumer {
    tag: String,
    tx: mpsc::Sender<Delivery>,
}

#[derive(Default)]
struct Queue {
    options: QueueOptions,
    buffer: VecDeque<Delivery>,
    consumers: Vec<Consumer>,
    next: usize,
    // A flusher task is currently draining `buffer`.
    flushing: bool,
}

#[derive(Default)]
struct State {
    queues: HashMap<String, Queue>,
    // exchange -> (routing key, queue name)
    bindings: HashMap<String, Vec<(String, String)>>,
    // consumer tag -> queue name
    consumers: HashMap<String, String>,
    anon_counter: u64,
}

/// An in-memory [`Transport`].
#[derive(Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<State>>,
}

impl MemoryTransport {
    /// Create an empty in-memory broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active consumers on a queue. Zero for unknown queues.
    ///
    /// Test observability hook: lets callers assert that RPC calls leave
    /// no dangling reply consumers behind.
    pub fn consumer_count(&self, queue: &str) -> usize {
        let state = self.state.lock();
        state.queues.get(queue).map_or(0, |q| q.consumers.len())
    }

    /// Total number of active consumers across all queues.
    pub fn active_consumers(&self) -> usize {
        self.state.lock().consumers.len()
    }

    /// Whether a queue currently exists.
    pub fn queue_exists(&self, queue: &str) -> bool {
        self.state.lock().queues.contains_key(queue)
    }

    /// Try to hand a delivery to one of the queue's consumers, round-robin,
    /// pruning consumers whose channel has closed. Returns the delivery
    /// back when every consumer is at capacity or none remain.
    fn offer(queue: &mut Queue, mut delivery: Delivery) -> Option<Delivery> {
        let mut attempts = 0;
        while !queue.consumers.is_empty() && attempts < queue.consumers.len() {
            let idx = queue.next % queue.consumers.len();
            match queue.consumers[idx].tx.try_send(delivery) {
                Ok(()) => {
                    queue.next = idx + 1;
                    return None;
                }
                Err(mpsc::error::TrySendError::Closed(d)) => {
                    queue.consumers.remove(idx);
                    delivery = d;
                }
                Err(mpsc::error::TrySendError::Full(d)) => {
                    queue.next = idx + 1;
                    attempts += 1;
                    delivery = d;
                }
            }
        }
        Some(delivery)
    }

    /// Drain a queue's overflow buffer, waiting for consumer capacity when
    /// every channel is full. At most one flusher runs per queue; the
    /// `flushing` flag guards the spawn.
    async fn flush_loop(state: Arc<Mutex<State>>, queue_name: String) {
        loop {
            let waiter = {
                let mut guard = state.lock();
                let Some(queue) = guard.queues.get_mut(&queue_name) else { return };
                while let Some(delivery) = queue.buffer.pop_front() {
                    if let Some(d) = Self::offer(queue, delivery) {
                        queue.buffer.push_front(d);
                        break;
                    }
                }
                if queue.buffer.is_empty() || queue.consumers.is_empty() {
                    queue.flushing = false;
                    return;
                }
                queue.consumers[queue.next % queue.consumers.len()].tx.clone()
            };

            // Wait for a slot without holding the lock.
            match waiter.reserve().await {
                Ok(permit) => {
                    let mut guard = state.lock();
                    let Some(queue) = guard.queues.get_mut(&queue_name) else { return };
                    let Some(delivery) = queue.buffer.pop_front() else {
                        queue.flushing = false;
                        return;
                    };
                    queue.next = queue.next.wrapping_add(1);
                    permit.send(delivery);
                }
                Err(_) => {
                    // The awaited consumer went away; prune and retry.
                    let mut guard = state.lock();
                    let Some(queue) = guard.queues.get_mut(&queue_name) else { return };
                    queue.consumers.retain(|c| !c.tx.is_closed());
                    if queue.consumers.is_empty() {
                        queue.flushing = false;
                        return;
                    }
                }
            };
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<String> {
        let mut state = self.state.lock();
        let name = if name.is_empty() {
            state.anon_counter += 1;
            format!("amq.gen-{}", state.anon_counter)
        } else {
            name.to_string()
        };
        state.queues.entry(name.clone()).or_insert_with(|| Queue {
            options,
            ..Default::default()
        });
        Ok(name)
    }

    async fn declare_exchange(&self, name: &str) -> Result<()> {
        self.state.lock().bindings.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !state.queues.contains_key(queue) {
            return Err(BrokerError::Transport(format!("unknown queue '{queue}'")));
        }
        state
            .bindings
            .entry(exchange.to_string())
            .or_default()
            .push((routing_key.to_string(), queue.to_string()));
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: Properties,
        body: Vec<u8>,
    ) -> Result<()> {
        let mut state = self.state.lock();

        let targets: Vec<String> = if exchange.is_empty() {
            // Default exchange: routing key names a queue directly.
            vec![routing_key.to_string()]
        } else {
            state
                .bindings
                .get(exchange)
                .map(|b| {
                    b.iter()
                        .filter(|(key, _)| key == routing_key || key == "#")
                        .map(|(_, queue)| queue.clone())
                        .collect()
                })
                .unwrap_or_default()
        };

        // Unroutable messages are dropped, as a real broker does for
        // non-mandatory publishes.
        let mut flush = Vec::new();
        for target in targets {
            if let Some(queue) = state.queues.get_mut(&target) {
                let delivery = Delivery::new(routing_key, properties.clone(), body.clone());
                // Anything already buffered must go out first; queueing
                // behind it keeps per-queue FIFO order.
                if queue.buffer.is_empty() {
                    if let Some(d) = Self::offer(queue, delivery) {
                        queue.buffer.push_back(d);
                    }
                } else {
                    queue.buffer.push_back(delivery);
                }
                if !queue.buffer.is_empty() && !queue.consumers.is_empty() && !queue.flushing {
                    queue.flushing = true;
                    flush.push(target);
                }
            } else {
                trace!("dropping message for unknown queue '{}'", target);
            }
        }
        drop(state);
        for name in flush {
            tokio::spawn(Self::flush_loop(self.state.clone(), name));
        }
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        _manual_ack: bool,
    ) -> Result<mpsc::Receiver<Delivery>> {
        let mut state = self.state.lock();
        if state.consumers.contains_key(consumer_tag) {
            return Err(BrokerError::Consume(format!(
                "consumer tag '{consumer_tag}' already in use"
            )));
        }
        let entry = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::Consume(format!("unknown queue '{queue}'")))?;

        let (tx, rx) = mpsc::channel(CONSUMER_BUFFER);
        entry.consumers.push(Consumer {
            tag: consumer_tag.to_string(),
            tx,
        });
        let needs_flush = !entry.buffer.is_empty() && !entry.flushing;
        if needs_flush {
            entry.flushing = true;
        }
        state
            .consumers
            .insert(consumer_tag.to_string(), queue.to_string());
        drop(state);
        if needs_flush {
            tokio::spawn(Self::flush_loop(self.state.clone(), queue.to_string()));
        }
        Ok(rx)
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<()> {
        let mut state = self.state.lock();
        let Some(queue_name) = state.consumers.remove(consumer_tag) else {
            return Ok(());
        };
        if let Some(queue) = state.queues.get_mut(&queue_name) {
            queue.consumers.retain(|c| c.tag != consumer_tag);
            if queue.options.auto_delete && queue.consumers.is_empty() {
                state.queues.remove(&queue_name);
            }
        }
        Ok(())
    }
}
