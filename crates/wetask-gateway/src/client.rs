//! Connected WebSocket clients.
//!
//! A client owns its socket through two pump tasks. The bounded outbox is
//! the only path to the socket's write side, and closing it is the sole
//! cancellation signal: the write pump drains it, sends a close frame when
//! it closes, and exits. The room set is client-local state: only the
//! client's own read pump mutates it, and the hub loop reads it at
//! broadcast time.

use crate::rooms;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Bound on the per-client outbound queue. A client that falls this far
/// behind is evicted rather than queued for.
pub const OUTBOX_CAPACITY: usize = 256;

/// Outcome of a non-blocking outbox send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Frame queued.
    Sent,
    /// Outbox full; the client is too slow.
    Full,
    /// Outbox already closed.
    Closed,
}

/// A connected client, shared between the hub loop and the client's pumps.
pub struct Client {
    id: u64,
    outbox: Mutex<Option<mpsc::Sender<String>>>,
    rooms: RwLock<HashSet<String>>,
    user_id: Mutex<Option<u64>>,
}

impl Client {
    /// Create a client with the default outbox capacity. Returns the
    /// shared handle and the receiving end for the write pump.
    pub fn new(id: u64) -> (Arc<Self>, mpsc::Receiver<String>) {
        Self::with_outbox_capacity(id, OUTBOX_CAPACITY)
    }

    /// Create a client with an explicit outbox capacity.
    pub fn with_outbox_capacity(id: u64, capacity: usize) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        let client = Arc::new(Self {
            id,
            outbox: Mutex::new(Some(tx)),
            rooms: RwLock::new(HashSet::new()),
            user_id: Mutex::new(None),
        });
        (client, rx)
    }

    /// Client identifier, unique per gateway process.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Join a room.
    pub fn join(&self, room: impl Into<String>) {
        self.rooms.write().insert(room.into());
    }

    /// Leave a room.
    pub fn leave(&self, room: &str) {
        self.rooms.write().remove(room);
    }

    /// Whether the client is currently in a room.
    pub fn in_room(&self, room: &str) -> bool {
        self.rooms.read().contains(room)
    }

    /// User identifier, recorded after a `join:team` message.
    pub fn user_id(&self) -> Option<u64> {
        *self.user_id.lock()
    }

    /// Attempt a non-blocking send to the outbox.
    pub fn try_send(&self, frame: &str) -> SendOutcome {
        let outbox = self.outbox.lock();
        let Some(tx) = outbox.as_ref() else {
            return SendOutcome::Closed;
        };
        match tx.try_send(frame.to_string()) {
            Ok(()) => SendOutcome::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => SendOutcome::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Close the outbox. Idempotent; the write pump sees the channel close
    /// and terminates the connection.
    pub fn close(&self) {
        self.outbox.lock().take();
    }

    fn set_user_id(&self, user_id: u64) {
        *self.user_id.lock() = Some(user_id);
    }
}

/// Inbound frames a client may send over its socket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    /// Subscribe to a board's task events.
    #[serde(rename = "join:board")]
    JoinBoard {
        #[serde(rename = "boardId")]
        board_id: u64,
    },

    /// Unsubscribe from a board.
    #[serde(rename = "leave:board")]
    LeaveBoard {
        #[serde(rename = "boardId")]
        board_id: u64,
    },

    /// Subscribe to a team's events and identify the user.
    #[serde(rename = "join:team")]
    JoinTeam {
        #[serde(rename = "teamId")]
        team_id: u64,
        #[serde(rename = "userId")]
        user_id: u64,
    },
}

impl ClientMessage {
    /// Apply the message to the client's own membership state.
    pub fn apply(self, client: &Client) {
        match self {
            Self::JoinBoard { board_id } => {
                debug!("client {} joins board {}", client.id(), board_id);
                client.join(rooms::board_room(board_id));
            }
            Self::LeaveBoard { board_id } => {
                client.leave(&rooms::board_room(board_id));
            }
            Self::JoinTeam { team_id, user_id } => {
                debug!("client {} joins team {} as user {}", client.id(), team_id, user_id);
                client.join(rooms::team_room(team_id));
                client.set_user_id(user_id);
            }
        }
    }
}
