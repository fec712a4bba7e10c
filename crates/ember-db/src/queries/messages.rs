use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use ember_types::models::{Message, MessageKind};

use crate::queries::OptionalExt;
use crate::queries::rooms::boundary_key;
use crate::{Database, parse_ts, ts};

impl Database {
    /// Insert a message together with the sender's read receipt, in one
    /// transaction. A sender has implicitly read their own message.
    pub fn insert_message(
        &self,
        id: Uuid,
        room_id: Uuid,
        sender_id: Uuid,
        kind: MessageKind,
        content: &str,
        metadata: Option<&serde_json::Value>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let now = ts(at);
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (id, room_id, sender_id, kind, content, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                (
                    id.to_string(),
                    room_id.to_string(),
                    sender_id.to_string(),
                    kind.as_str(),
                    content,
                    metadata.map(|m| m.to_string()),
                    &now,
                ),
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at)
                 VALUES (?1, ?2, ?3)",
                (id.to_string(), sender_id.to_string(), &now),
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Full room history after the viewer's boundary, oldest first, with
    /// sender names and read-by sets attached.
    pub fn room_messages(
        &self,
        room_id: Uuid,
        boundary: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.sender_id, u.username, m.kind, m.content, m.metadata, m.created_at
                 FROM messages m
                 LEFT JOIN users u ON m.sender_id = u.id
                 WHERE m.room_id = ?1 AND m.created_at > ?2
                 ORDER BY m.created_at, m.id",
            )?;

            let rows = stmt
                .query_map((room_id.to_string(), boundary_key(boundary)), |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let ids: Vec<String> = rows.iter().map(|r| r.0.clone()).collect();
            let mut read_by = query_reads(conn, &ids)?;

            rows.into_iter()
                .map(|(id, sender_id, sender_name, kind, content, metadata, created_at)| {
                    Ok(Message {
                        id: id.parse().context("message id")?,
                        room_id,
                        sender_id: sender_id.parse().context("message sender_id")?,
                        sender_name: sender_name.unwrap_or_else(|| "unknown".to_string()),
                        kind: kind.parse()?,
                        content,
                        metadata: metadata
                            .as_deref()
                            .map(serde_json::from_str)
                            .transpose()
                            .context("message metadata")?,
                        read_by: read_by.remove(&id).unwrap_or_default(),
                        created_at: parse_ts(&created_at)?,
                    })
                })
                .collect()
        })
    }

    /// Room and sender of a message, if it exists.
    pub fn message_meta(&self, message_id: Uuid) -> Result<Option<(Uuid, Uuid)>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT room_id, sender_id FROM messages WHERE id = ?1",
                    [message_id.to_string()],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;

            row.map(|(room, sender)| {
                Ok((
                    room.parse().context("message room_id")?,
                    sender.parse().context("message sender_id")?,
                ))
            })
            .transpose()
        })
    }

    /// Add the reader to a message's read-by set. Returns true if newly added.
    pub fn mark_read(&self, message_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let rows = conn.execute(
                "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at)
                 VALUES (?1, ?2, ?3)",
                (message_id.to_string(), user_id.to_string(), ts(at)),
            )?;
            Ok(rows > 0)
        })
    }

    /// Mark every message in the room not authored by the reader as read.
    /// Returns the ids that were newly marked.
    pub fn mark_room_read(
        &self,
        room_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        let now = ts(at);
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let unread: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT m.id FROM messages m
                     WHERE m.room_id = ?1
                       AND m.sender_id != ?2
                       AND NOT EXISTS (
                           SELECT 1 FROM message_reads mr
                           WHERE mr.message_id = m.id AND mr.user_id = ?2
                       )
                     ORDER BY m.created_at, m.id",
                )?;
                stmt.query_map((room_id.to_string(), reader_id.to_string()), |row| {
                    row.get(0)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?
            };

            for id in &unread {
                tx.execute(
                    "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at)
                     VALUES (?1, ?2, ?3)",
                    (id, reader_id.to_string(), &now),
                )?;
            }

            tx.commit()?;

            unread
                .iter()
                .map(|id| id.parse().context("message id"))
                .collect()
        })
    }
}

/// Batch-fetch read-by sets for a set of message IDs.
fn query_reads(conn: &Connection, message_ids: &[String]) -> Result<HashMap<String, Vec<Uuid>>> {
    if message_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders: Vec<String> = (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT message_id, user_id FROM message_reads WHERE message_id IN ({})",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
        .iter()
        .map(|id| id as &dyn rusqlite::types::ToSql)
        .collect();

    let rows = stmt
        .query_map(params.as_slice(), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut map: HashMap<String, Vec<Uuid>> = HashMap::new();
    for (message_id, user_id) in rows {
        map.entry(message_id)
            .or_default()
            .push(user_id.parse().context("reader id")?);
    }
    Ok(map)
}
