use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::queries::OptionalExt;
use crate::{Database, parse_ts, ts};

impl Database {
    /// Raise (never lower) the viewer's personal deletion boundary for a
    /// room. Stored independently of messages; message rows are untouched.
    pub fn raise_deletion_boundary(
        &self,
        room_id: Uuid,
        viewer_id: Uuid,
        up_to: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO deletion_boundaries (room_id, viewer_id, deleted_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(room_id, viewer_id) DO UPDATE SET
                   deleted_at = MAX(deleted_at, excluded.deleted_at)",
                (room_id.to_string(), viewer_id.to_string(), ts(up_to)),
            )?;
            Ok(())
        })
    }

    pub fn deletion_boundary(
        &self,
        room_id: Uuid,
        viewer_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>> {
        let raw = self.with_conn(|conn| {
            conn.query_row(
                "SELECT deleted_at FROM deletion_boundaries
                 WHERE room_id = ?1 AND viewer_id = ?2",
                (room_id.to_string(), viewer_id.to_string()),
                |row| row.get::<_, String>(0),
            )
            .optional()
        })?;

        raw.as_deref().map(parse_ts).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn seed_room(db: &Database) -> (Uuid, Uuid) {
        let viewer = Uuid::new_v4();
        db.create_user(&viewer.to_string(), "viewer", "x", "free", Utc::now())
            .unwrap();
        let room = Uuid::new_v4();
        db.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO rooms (id, display_name, created_at) VALUES (?1, NULL, ?2)",
                (room.to_string(), ts(Utc::now())),
            )?;
            Ok(())
        })
        .unwrap();
        (room, viewer)
    }

    #[test]
    fn boundary_only_moves_forward() {
        let db = Database::open_in_memory().unwrap();
        let (room, viewer) = seed_room(&db);

        let later = Utc.with_ymd_and_hms(2026, 5, 20, 12, 0, 0).unwrap();
        let earlier = later - Duration::hours(1);

        db.raise_deletion_boundary(room, viewer, later).unwrap();
        db.raise_deletion_boundary(room, viewer, earlier).unwrap();

        assert_eq!(db.deletion_boundary(room, viewer).unwrap(), Some(later));
    }

    #[test]
    fn boundary_is_per_viewer() {
        let db = Database::open_in_memory().unwrap();
        let (room, viewer) = seed_room(&db);
        let other = Uuid::new_v4();
        db.create_user(&other.to_string(), "other", "x", "free", Utc::now())
            .unwrap();

        db.raise_deletion_boundary(room, viewer, Utc::now()).unwrap();

        assert!(db.deletion_boundary(room, viewer).unwrap().is_some());
        assert!(db.deletion_boundary(room, other).unwrap().is_none());
    }
}
