use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use ember_types::models::{MessagePreview, Room};

use crate::models::RoomListRow;
use crate::queries::OptionalExt;
use crate::{Database, parse_ts, ts};

impl Database {
    pub fn get_room(&self, room_id: Uuid) -> Result<Option<Room>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT display_name, created_at FROM rooms WHERE id = ?1",
                    [room_id.to_string()],
                    |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;

            row.map(|(display_name, created_at)| {
                Ok(Room {
                    id: room_id,
                    display_name,
                    created_at: parse_ts(&created_at)?,
                })
            })
            .transpose()
        })
    }

    pub fn is_participant(&self, room_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM room_participants WHERE room_id = ?1 AND user_id = ?2",
                (room_id.to_string(), user_id.to_string()),
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// The other participant of a 1:1 room, derived by excluding the viewer.
    pub fn other_participant(&self, room_id: Uuid, viewer_id: Uuid) -> Result<Option<(Uuid, String)>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT u.id, u.username
                     FROM room_participants rp
                     JOIN users u ON u.id = rp.user_id
                     WHERE rp.room_id = ?1 AND rp.user_id != ?2
                     LIMIT 1",
                    (room_id.to_string(), viewer_id.to_string()),
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;

            row.map(|(id, name)| Ok((id.parse().context("participant id")?, name)))
                .transpose()
        })
    }

    // -- hidden_for set --

    /// Returns true if the room was newly hidden for this user.
    pub fn hide_room(&self, room_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let rows = conn.execute(
                "INSERT OR IGNORE INTO room_hidden (room_id, user_id, hidden_at) VALUES (?1, ?2, ?3)",
                (room_id.to_string(), user_id.to_string(), ts(at)),
            )?;
            Ok(rows > 0)
        })
    }

    /// Returns true if the room had been hidden. No-op when already visible.
    pub fn unhide_room(&self, room_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let rows = conn.execute(
                "DELETE FROM room_hidden WHERE room_id = ?1 AND user_id = ?2",
                (room_id.to_string(), user_id.to_string()),
            )?;
            Ok(rows > 0)
        })
    }

    pub fn is_room_hidden(&self, room_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM room_hidden WHERE room_id = ?1 AND user_id = ?2",
                (room_id.to_string(), user_id.to_string()),
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    // -- room list --

    /// Rooms the viewer participates in and has not hidden, with the derived
    /// counterpart and the viewer's deletion boundary attached.
    pub fn visible_rooms(&self, viewer_id: Uuid) -> Result<Vec<RoomListRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, u.id, u.username, b.deleted_at
                 FROM rooms r
                 JOIN room_participants rp  ON rp.room_id = r.id AND rp.user_id = ?1
                 JOIN room_participants rp2 ON rp2.room_id = r.id AND rp2.user_id != ?1
                 JOIN users u ON u.id = rp2.user_id
                 LEFT JOIN deletion_boundaries b
                        ON b.room_id = r.id AND b.viewer_id = ?1
                 WHERE NOT EXISTS (
                     SELECT 1 FROM room_hidden h
                     WHERE h.room_id = r.id AND h.user_id = ?1
                 )
                 ORDER BY r.created_at DESC",
            )?;

            let rows = stmt
                .query_map([viewer_id.to_string()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(room_id, counterpart_id, counterpart_name, boundary)| {
                    Ok(RoomListRow {
                        room_id: room_id.parse().context("room id")?,
                        counterpart_id: counterpart_id.parse().context("counterpart id")?,
                        counterpart_name,
                        boundary: boundary.as_deref().map(parse_ts).transpose()?,
                    })
                })
                .collect()
        })
    }

    /// Latest message in the room after the viewer's boundary, if any.
    pub fn latest_message(
        &self,
        room_id: Uuid,
        boundary: Option<DateTime<Utc>>,
    ) -> Result<Option<MessagePreview>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT kind, content, created_at FROM messages
                     WHERE room_id = ?1 AND created_at > ?2
                     ORDER BY created_at DESC, id DESC
                     LIMIT 1",
                    (room_id.to_string(), boundary_key(boundary)),
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .optional()?;

            row.map(|(kind, content, created_at)| {
                let kind = kind.parse()?;
                Ok(MessagePreview {
                    kind,
                    preview: ember_types::models::preview_text(kind, &content),
                    created_at: parse_ts(&created_at)?,
                })
            })
            .transpose()
        })
    }

    /// Messages the viewer has not read, excluding their own, after the boundary.
    pub fn unread_count(
        &self,
        room_id: Uuid,
        viewer_id: Uuid,
        boundary: Option<DateTime<Utc>>,
    ) -> Result<u32> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages m
                 WHERE m.room_id = ?1
                   AND m.sender_id != ?2
                   AND m.created_at > ?3
                   AND NOT EXISTS (
                       SELECT 1 FROM message_reads mr
                       WHERE mr.message_id = m.id AND mr.user_id = ?2
                   )",
                (room_id.to_string(), viewer_id.to_string(), boundary_key(boundary)),
                |row| row.get(0),
            )?;
            Ok(count as u32)
        })
    }
}

/// SQL comparison key for an optional deletion boundary. The empty string
/// sorts before every timestamp, so "no boundary" keeps all messages.
pub(crate) fn boundary_key(boundary: Option<DateTime<Utc>>) -> String {
    boundary.map(ts).unwrap_or_default()
}
