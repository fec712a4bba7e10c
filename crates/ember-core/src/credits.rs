use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use ember_db::Database;
use ember_types::models::CreditTransaction;

use crate::error::{CoreError, CoreResult};

/// Outcome of one gate pass. `balance` is the balance after the call either
/// way, so the caller can show it without a second read.
#[derive(Debug, Clone, Copy)]
pub struct CreditDecision {
    pub allowed: bool,
    pub balance: i64,
}

/// Gates chargeable sends behind the per-user consumable balance.
///
/// The check and the decrement are one conditional UPDATE in the store, so
/// two concurrent sends at balance 1 can never both pass — the losing writer
/// observes `allowed = false`, and the balance never goes negative.
#[derive(Clone)]
pub struct CreditGate {
    db: Arc<Database>,
}

impl CreditGate {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn check_and_decrement(&self, user_id: Uuid, at: DateTime<Utc>) -> CoreResult<CreditDecision> {
        let (allowed, balance) = self
            .db
            .try_decrement_credit(user_id, "message_send", at)
            .map_err(CoreError::store)?;
        Ok(CreditDecision { allowed, balance })
    }

    pub fn balance(&self, user_id: Uuid) -> CoreResult<i64> {
        self.db.credit_balance(user_id).map_err(CoreError::store)
    }

    /// Top up the balance (signup grant, promo, purchase fulfilment).
    pub fn grant(&self, user_id: Uuid, amount: i64, reason: &str, at: DateTime<Utc>) -> CoreResult<i64> {
        if amount <= 0 {
            return Err(CoreError::BadRequest("grant amount must be positive"));
        }
        self.db
            .grant_credits(user_id, amount, reason, at)
            .map_err(CoreError::store)
    }

    /// Append-only audit trail, newest first.
    pub fn transactions(&self, user_id: Uuid) -> CoreResult<Vec<CreditTransaction>> {
        self.db.credit_transactions(user_id).map_err(CoreError::store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_user, test_db};

    #[test]
    fn decrement_denied_at_zero_without_mutation() {
        let db = test_db();
        let gate = CreditGate::new(db.clone());
        let user = seed_user(&db, "casey", 0);

        let decision = gate.check_and_decrement(user, Utc::now()).unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.balance, 0);
        assert!(gate.transactions(user).unwrap().is_empty());
    }

    #[test]
    fn grant_then_spend_round_trip() {
        let db = test_db();
        let gate = CreditGate::new(db.clone());
        let user = seed_user(&db, "casey", 0);

        assert_eq!(gate.grant(user, 3, "signup_grant", Utc::now()).unwrap(), 3);

        let decision = gate.check_and_decrement(user, Utc::now()).unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.balance, 2);
        assert_eq!(gate.balance(user).unwrap(), 2);
    }

    #[test]
    fn zero_grant_is_rejected() {
        let db = test_db();
        let gate = CreditGate::new(db.clone());
        let user = seed_user(&db, "casey", 0);

        assert!(matches!(
            gate.grant(user, 0, "promo", Utc::now()),
            Err(CoreError::BadRequest(_))
        ));
    }
}
