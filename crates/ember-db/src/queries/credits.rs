use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use ember_types::models::CreditTransaction;

use crate::{Database, parse_ts, ts};

impl Database {
    /// Atomic decrement-with-floor: the check and the decrement are one
    /// conditional UPDATE, so two concurrent sends at balance 1 can never
    /// both pass. Returns (allowed, balance after the call) and appends the
    /// audit row only when the decrement happened.
    pub fn try_decrement_credit(
        &self,
        user_id: Uuid,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(bool, i64)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let rows = tx.execute(
                "UPDATE credit_balances SET amount = amount - 1
                 WHERE user_id = ?1 AND amount > 0",
                [user_id.to_string()],
            )?;
            let allowed = rows > 0;

            let balance = query_balance(&tx, user_id)?;

            if allowed {
                tx.execute(
                    "INSERT INTO credit_transactions (id, user_id, delta, reason, created_at)
                     VALUES (?1, ?2, -1, ?3, ?4)",
                    (Uuid::new_v4().to_string(), user_id.to_string(), reason, ts(at)),
                )?;
            }

            tx.commit()?;
            Ok((allowed, balance))
        })
    }

    pub fn credit_balance(&self, user_id: Uuid) -> Result<i64> {
        self.with_conn(|conn| query_balance(conn, user_id))
    }

    /// Top up a user's balance (signup grant, promo, purchase fulfilment).
    /// Returns the new balance.
    pub fn grant_credits(
        &self,
        user_id: Uuid,
        amount: i64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO credit_balances (user_id, amount) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET amount = amount + excluded.amount",
                (user_id.to_string(), amount),
            )?;
            tx.execute(
                "INSERT INTO credit_transactions (id, user_id, delta, reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    Uuid::new_v4().to_string(),
                    user_id.to_string(),
                    amount,
                    reason,
                    ts(at),
                ),
            )?;

            let balance = query_balance(&tx, user_id)?;
            tx.commit()?;
            Ok(balance)
        })
    }

    /// Audit trail, newest first.
    pub fn credit_transactions(&self, user_id: Uuid) -> Result<Vec<CreditTransaction>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, delta, reason, created_at FROM credit_transactions
                 WHERE user_id = ?1 ORDER BY created_at DESC",
            )?;

            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(id, delta, reason, created_at)| {
                    Ok(CreditTransaction {
                        id: id.parse().context("transaction id")?,
                        user_id,
                        delta,
                        reason,
                        created_at: parse_ts(&created_at)?,
                    })
                })
                .collect()
        })
    }
}

fn query_balance(conn: &Connection, user_id: Uuid) -> Result<i64> {
    let amount: Option<i64> = conn
        .query_row(
            "SELECT amount FROM credit_balances WHERE user_id = ?1",
            [user_id.to_string()],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            e => Err(e),
        })?;
    Ok(amount.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_user(db: &Database) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(&id.to_string(), "casey", "x", "free", Utc::now())
            .unwrap();
        id
    }

    #[test]
    fn decrement_stops_at_zero() {
        let db = Database::open_in_memory().unwrap();
        let user = seed_user(&db);
        db.grant_credits(user, 1, "signup_grant", Utc::now()).unwrap();

        let (allowed, balance) = db.try_decrement_credit(user, "message_send", Utc::now()).unwrap();
        assert!(allowed);
        assert_eq!(balance, 0);

        let (allowed, balance) = db.try_decrement_credit(user, "message_send", Utc::now()).unwrap();
        assert!(!allowed);
        assert_eq!(balance, 0);
    }

    #[test]
    fn missing_balance_row_behaves_as_zero() {
        let db = Database::open_in_memory().unwrap();
        let user = seed_user(&db);

        assert_eq!(db.credit_balance(user).unwrap(), 0);
        let (allowed, balance) = db.try_decrement_credit(user, "message_send", Utc::now()).unwrap();
        assert!(!allowed);
        assert_eq!(balance, 0);
    }

    #[test]
    fn audit_rows_only_for_successful_decrements() {
        let db = Database::open_in_memory().unwrap();
        let user = seed_user(&db);
        db.grant_credits(user, 1, "signup_grant", Utc::now()).unwrap();

        db.try_decrement_credit(user, "message_send", Utc::now()).unwrap();
        db.try_decrement_credit(user, "message_send", Utc::now()).unwrap();

        let txns = db.credit_transactions(user).unwrap();
        assert_eq!(txns.len(), 2); // grant + one decrement
        assert_eq!(txns.iter().map(|t| t.delta).sum::<i64>(), 0);
    }

    #[test]
    fn concurrent_decrements_never_go_negative() {
        let db = std::sync::Arc::new(Database::open_in_memory().unwrap());
        let user = seed_user(&db);
        db.grant_credits(user, 1, "signup_grant", Utc::now()).unwrap();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let db = db.clone();
            handles.push(std::thread::spawn(move || {
                db.try_decrement_credit(user, "message_send", Utc::now()).unwrap()
            }));
        }

        let results: Vec<(bool, i64)> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let wins = results.iter().filter(|(allowed, _)| *allowed).count();
        assert_eq!(wins, 1);
        assert_eq!(db.credit_balance(user).unwrap(), 0);
    }
}
