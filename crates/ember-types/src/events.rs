use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MessageKind;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A new message was posted to a room
    MessageCreate {
        id: Uuid,
        room_id: Uuid,
        sender_id: Uuid,
        sender_name: String,
        kind: MessageKind,
        content: String,
        metadata: Option<serde_json::Value>,
        created_at: DateTime<Utc>,
    },

    /// A reader acknowledged messages in a room
    MessageRead {
        room_id: Uuid,
        reader_id: Uuid,
        message_ids: Vec<Uuid>,
    },

    /// A mutual match was created or reactivated
    MatchCreate {
        match_id: Uuid,
        room_id: Uuid,
        user_a: Uuid,
        user_b: Uuid,
    },

    /// The receiving user hid a room (targeted, never broadcast)
    RoomHidden { room_id: Uuid },

    /// A user came online or went offline
    PresenceUpdate {
        user_id: Uuid,
        username: String,
        online: bool,
    },
}

impl GatewayEvent {
    /// Returns the room_id if this event is scoped to a specific room.
    /// Events that return `None` are global and should be delivered to all clients.
    pub fn room_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { room_id, .. } => Some(*room_id),
            Self::MessageRead { room_id, .. } => Some(*room_id),
            // Ready, MatchCreate, RoomHidden, PresenceUpdate are delivered
            // regardless of room subscriptions
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Subscribe to events for specific rooms.
    /// The server will only forward room-scoped events (messages, read
    /// receipts) for rooms the client has subscribed to.
    Subscribe { room_ids: Vec<Uuid> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_events_are_room_scoped() {
        let room_id = Uuid::new_v4();
        let event = GatewayEvent::MessageRead {
            room_id,
            reader_id: Uuid::new_v4(),
            message_ids: vec![],
        };
        assert_eq!(event.room_id(), Some(room_id));

        let global = GatewayEvent::MatchCreate {
            match_id: Uuid::new_v4(),
            room_id,
            user_a: Uuid::new_v4(),
            user_b: Uuid::new_v4(),
        };
        assert_eq!(global.room_id(), None);
    }

    #[test]
    fn events_use_tagged_wire_format() {
        let event = GatewayEvent::RoomHidden {
            room_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "RoomHidden");
        assert!(json["data"]["room_id"].is_string());
    }
}
