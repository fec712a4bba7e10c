use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use ember_db::Database;
use ember_gateway::dispatcher::Dispatcher;
use ember_types::events::GatewayEvent;
use ember_types::models::RoomSummary;

use crate::error::{CoreError, CoreResult};

/// Per-(room, user) visibility. Hiding is strictly per-user soft deletion:
/// it never affects the other participant's list or read state, and the
/// underlying room and messages are never touched.
pub struct VisibilityService {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl VisibilityService {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    /// Visible -> Hidden, on explicit user action only.
    pub fn hide(&self, room_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> CoreResult<()> {
        self.require_participant(room_id, user_id)?;

        let newly_hidden = self
            .db
            .hide_room(room_id, user_id, at)
            .map_err(CoreError::store)?;

        if newly_hidden {
            // Targeted: the counterpart must not learn the room was hidden
            self.dispatcher
                .send_to_user(user_id, GatewayEvent::RoomHidden { room_id });
        }
        Ok(())
    }

    /// Hidden -> Visible. Idempotent: a no-op if already visible, and a
    /// missing room is treated as already resolved.
    pub fn unhide(&self, room_id: Uuid, user_id: Uuid) -> CoreResult<()> {
        self.db
            .unhide_room(room_id, user_id)
            .map_err(CoreError::store)?;
        Ok(())
    }

    pub fn is_hidden(&self, room_id: Uuid, user_id: Uuid) -> CoreResult<bool> {
        self.db
            .is_room_hidden(room_id, user_id)
            .map_err(CoreError::store)
    }

    /// Rooms the viewer participates in and has not hidden, each annotated
    /// with the counterpart, latest preview and unread count, most recently
    /// active first.
    pub fn list_visible(&self, viewer_id: Uuid) -> CoreResult<Vec<RoomSummary>> {
        let rows = self.db.visible_rooms(viewer_id).map_err(CoreError::store)?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let last_message = self
                .db
                .latest_message(row.room_id, row.boundary)
                .map_err(CoreError::store)?;
            let unread_count = self
                .db
                .unread_count(row.room_id, viewer_id, row.boundary)
                .map_err(CoreError::store)?;

            summaries.push(RoomSummary {
                room_id: row.room_id,
                counterpart_id: row.counterpart_id,
                counterpart_name: row.counterpart_name,
                last_message,
                unread_count,
            });
        }

        // Most recently active conversation first; empty rooms keep their
        // room-creation order at the end
        summaries.sort_by(|a, b| {
            let a_at = a.last_message.as_ref().map(|m| m.created_at);
            let b_at = b.last_message.as_ref().map(|m| m.created_at);
            b_at.cmp(&a_at)
        });

        Ok(summaries)
    }

    pub(crate) fn require_participant(&self, room_id: Uuid, user_id: Uuid) -> CoreResult<()> {
        require_participant(&self.db, room_id, user_id)
    }
}

/// Room must exist and the user must be one of its participants.
pub(crate) fn require_participant(db: &Database, room_id: Uuid, user_id: Uuid) -> CoreResult<()> {
    if db.get_room(room_id).map_err(CoreError::store)?.is_none() {
        return Err(CoreError::NotFound("room"));
    }
    if !db
        .is_participant(room_id, user_id)
        .map_err(CoreError::store)?
    {
        return Err(CoreError::NotParticipant);
    }
    Ok(())
}
