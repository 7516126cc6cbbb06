//! Event-to-room mapping.
//!
//! Rooms are not stored anywhere; a room exists exactly as long as some
//! client's membership set names it. This module only derives the target
//! room key from an event's routing key and payload.

use serde_json::Value;
use wetask_core::events;

/// Derive the room an event should be fanned out to.
///
/// Task lifecycle events go to the task's board; board updates and team
/// membership changes go to the owning team. Events missing the id field
/// map to no room and are dropped by the hub.
pub fn room_for_event(routing_key: &str, payload: &Value) -> Option<String> {
    match routing_key {
        events::TASK_CREATED | events::TASK_UPDATED | events::TASK_DELETED => {
            id_field(payload, "boardId").map(|id| format!("board:{id}"))
        }
        events::BOARD_UPDATED | events::TEAM_MEMBER_ADDED | events::TEAM_MEMBER_REMOVED => {
            id_field(payload, "teamId").map(|id| format!("team:{id}"))
        }
        _ => None,
    }
}

/// Room key for a board id, as used by the client join protocol.
pub fn board_room(board_id: u64) -> String {
    format!("board:{board_id}")
}

/// Room key for a team id.
pub fn team_room(team_id: u64) -> String {
    format!("team:{team_id}")
}

fn id_field(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::Number(n) => n.as_u64().map(|id| id.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
