use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use ember_types::models::{Interaction, SwipeKind};

use crate::queries::OptionalExt;
use crate::{Database, parse_ts, ts};

impl Database {
    /// Upsert the directed (actor, target) interaction. A later write
    /// overwrites `kind` in place; rows are never deleted. Safe to retry.
    pub fn upsert_interaction(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
        kind: SwipeKind,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO interactions (actor_id, target_id, kind, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(actor_id, target_id) DO UPDATE SET
                   kind = excluded.kind,
                   updated_at = excluded.updated_at",
                (
                    actor_id.to_string(),
                    target_id.to_string(),
                    kind.as_str(),
                    ts(at),
                ),
            )?;
            Ok(())
        })
    }

    pub fn get_interaction(&self, actor_id: Uuid, target_id: Uuid) -> Result<Option<Interaction>> {
        let row = self.with_conn(|conn| {
            conn.query_row(
                "SELECT kind, updated_at FROM interactions WHERE actor_id = ?1 AND target_id = ?2",
                (actor_id.to_string(), target_id.to_string()),
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
        })?;

        let Some((kind, updated_at)) = row else {
            return Ok(None);
        };

        Ok(Some(Interaction {
            actor_id,
            target_id,
            kind: kind
                .parse()
                .with_context(|| format!("interaction {}->{}", actor_id, target_id))?,
            updated_at: parse_ts(&updated_at)?,
        }))
    }
}
