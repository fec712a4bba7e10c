use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use ember_types::models::{Match, MatchStatus};

use crate::queries::OptionalExt;
use crate::{Database, parse_ts, ts};

/// What `activate_match` did for the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchActivation {
    /// No row existed for the pair; match and shared room were created.
    Created,
    /// An inactive row existed and was flipped back to active.
    Reactivated,
    /// The pair was already actively matched; nothing changed.
    AlreadyActive,
}

impl Database {
    /// Activate the match for the unordered (a, b) pair, creating the match
    /// row, its shared room and both participant rows the first time. The
    /// pair, not the row id, is the dedup key: calling this again reuses the
    /// existing row (reactivating it if a prior match had been invalidated).
    ///
    /// `new_match_id` / `new_room_id` are only consumed on `Created`.
    pub fn activate_match(
        &self,
        new_match_id: Uuid,
        new_room_id: Uuid,
        a: Uuid,
        b: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(Match, MatchActivation)> {
        let (user_a, user_b) = normalize_pair(a, b);
        let now = ts(at);

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing = tx
                .query_row(
                    "SELECT id, room_id, status, created_at, updated_at
                     FROM matches WHERE user_a = ?1 AND user_b = ?2",
                    (user_a.to_string(), user_b.to_string()),
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    },
                )
                .optional()?;

            let (m, activation) = match existing {
                None => {
                    tx.execute(
                        "INSERT INTO rooms (id, display_name, created_at) VALUES (?1, NULL, ?2)",
                        (new_room_id.to_string(), &now),
                    )?;
                    for user in [user_a, user_b] {
                        tx.execute(
                            "INSERT INTO room_participants (room_id, user_id, joined_at)
                             VALUES (?1, ?2, ?3)",
                            (new_room_id.to_string(), user.to_string(), &now),
                        )?;
                    }
                    tx.execute(
                        "INSERT INTO matches (id, user_a, user_b, room_id, status, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?5)",
                        (
                            new_match_id.to_string(),
                            user_a.to_string(),
                            user_b.to_string(),
                            new_room_id.to_string(),
                            &now,
                        ),
                    )?;

                    let m = Match {
                        id: new_match_id,
                        user_a,
                        user_b,
                        room_id: new_room_id,
                        status: MatchStatus::Active,
                        created_at: at,
                        updated_at: at,
                    };
                    (m, MatchActivation::Created)
                }
                Some((id, room_id, status, created_at, updated_at)) => {
                    let reactivated = status != "active";
                    if reactivated {
                        tx.execute(
                            "UPDATE matches SET status = 'active', updated_at = ?2 WHERE id = ?1",
                            (&id, &now),
                        )?;
                    }

                    let m = Match {
                        id: id.parse().context("match id")?,
                        user_a,
                        user_b,
                        room_id: room_id.parse().context("match room_id")?,
                        status: MatchStatus::Active,
                        created_at: parse_ts(&created_at)?,
                        updated_at: if reactivated { at } else { parse_ts(&updated_at)? },
                    };
                    let activation = if reactivated {
                        MatchActivation::Reactivated
                    } else {
                        MatchActivation::AlreadyActive
                    };
                    (m, activation)
                }
            };

            tx.commit()?;
            Ok((m, activation))
        })
    }

    pub fn get_match_by_pair(&self, a: Uuid, b: Uuid) -> Result<Option<Match>> {
        let (user_a, user_b) = normalize_pair(a, b);
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, room_id, status, created_at, updated_at
                     FROM matches WHERE user_a = ?1 AND user_b = ?2",
                    (user_a.to_string(), user_b.to_string()),
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    },
                )
                .optional()?;

            row.map(|(id, room_id, status, created_at, updated_at)| {
                Ok(Match {
                    id: id.parse().context("match id")?,
                    user_a,
                    user_b,
                    room_id: room_id.parse().context("match room_id")?,
                    status: status.parse()?,
                    created_at: parse_ts(&created_at)?,
                    updated_at: parse_ts(&updated_at)?,
                })
            })
            .transpose()
        })
    }

    /// Used when a match is invalidated (e.g. one side withdraws the like).
    pub fn set_match_status(&self, match_id: Uuid, status: MatchStatus, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let rows = conn.execute(
                "UPDATE matches SET status = ?2, updated_at = ?3 WHERE id = ?1",
                (match_id.to_string(), status.as_str(), ts(at)),
            )?;
            Ok(rows > 0)
        })
    }

    pub fn count_matches(&self) -> Result<i64> {
        self.with_conn(|conn| count(conn, "matches"))
    }
}

fn count(conn: &Connection, table: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}

/// Order the pair so `user_a <= user_b`.
pub fn normalize_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b { (a, b) } else { (b, a) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_users(db: &Database, ids: &[Uuid]) {
        for (i, id) in ids.iter().enumerate() {
            db.create_user(&id.to_string(), &format!("user{}", i), "x", "free", Utc::now())
                .unwrap();
        }
    }

    #[test]
    fn activation_is_idempotent_per_pair() {
        let db = Database::open_in_memory().unwrap();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        seed_users(&db, &[a, b]);

        let (m1, act1) = db
            .activate_match(Uuid::new_v4(), Uuid::new_v4(), a, b, Utc::now())
            .unwrap();
        assert_eq!(act1, MatchActivation::Created);

        // Second activation, arguments in the opposite order
        let (m2, act2) = db
            .activate_match(Uuid::new_v4(), Uuid::new_v4(), b, a, Utc::now())
            .unwrap();
        assert_eq!(act2, MatchActivation::AlreadyActive);
        assert_eq!(m1.id, m2.id);
        assert_eq!(m1.room_id, m2.room_id);
        assert_eq!(db.count_matches().unwrap(), 1);
    }

    #[test]
    fn inactive_match_is_reactivated_not_duplicated() {
        let db = Database::open_in_memory().unwrap();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        seed_users(&db, &[a, b]);

        let (m, _) = db
            .activate_match(Uuid::new_v4(), Uuid::new_v4(), a, b, Utc::now())
            .unwrap();
        db.set_match_status(m.id, MatchStatus::Inactive, Utc::now()).unwrap();

        let (m2, act) = db
            .activate_match(Uuid::new_v4(), Uuid::new_v4(), a, b, Utc::now())
            .unwrap();
        assert_eq!(act, MatchActivation::Reactivated);
        assert_eq!(m2.id, m.id);
        assert_eq!(m2.status, MatchStatus::Active);
        assert_eq!(db.count_matches().unwrap(), 1);
    }
}
