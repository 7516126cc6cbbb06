//! Event routing keys for the pub/sub side.
//!
//! Events are published to the `events` topic exchange after a mutation
//! commits, with one of these dot-separated names as the routing key. The
//! gateway binds a single durable queue to all of them.

/// Topic exchange all events flow through.
pub const EVENTS_EXCHANGE: &str = "events";

/// Durable queue the gateway consumes events from.
pub const EVENTS_QUEUE: &str = "events_queue";

pub const TASK_CREATED: &str = "task.created";
pub const TASK_UPDATED: &str = "task.updated";
pub const TASK_DELETED: &str = "task.deleted";
pub const BOARD_UPDATED: &str = "board.updated";
pub const TEAM_MEMBER_ADDED: &str = "team.memberAdded";
pub const TEAM_MEMBER_REMOVED: &str = "team.memberRemoved";

/// Every event routing key, in binding order.
pub const ALL: &[&str] = &[
    TASK_CREATED,
    TASK_UPDATED,
    TASK_DELETED,
    BOARD_UPDATED,
    TEAM_MEMBER_ADDED,
    TEAM_MEMBER_REMOVED,
];
