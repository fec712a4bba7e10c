use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use ember_db::Database;
use ember_db::queries::matches::MatchActivation;
use ember_gateway::dispatcher::Dispatcher;
use ember_types::events::GatewayEvent;

use crate::error::{CoreError, CoreResult};
use crate::notify::Notifier;

/// Result of a match check. `match_id`/`room_id` are present whenever
/// `is_match` is true, whether the match was just created or already existed.
#[derive(Debug, Clone, Copy)]
pub struct MatchOutcome {
    pub is_match: bool,
    pub match_id: Option<Uuid>,
    pub room_id: Option<Uuid>,
}

impl MatchOutcome {
    fn no_match() -> Self {
        Self {
            is_match: false,
            match_id: None,
            room_id: None,
        }
    }
}

/// Derives mutual matches from directional interactions.
pub struct MatchDetector {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    notifier: Arc<dyn Notifier>,
}

impl MatchDetector {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db,
            dispatcher,
            notifier,
        }
    }

    /// Check whether `actor` and `target` now like each other, and if so
    /// activate the match for the pair (creating the match row and its
    /// shared room the first time, reactivating the existing row otherwise).
    ///
    /// Idempotent: calling this again for an already-matched pair reports
    /// `is_match = true` with the same ids and creates nothing. A failure
    /// here is surfaced but never rolls back the interaction that triggered
    /// the check — the two writes are independently consistent.
    pub fn check_and_create(
        &self,
        actor: Uuid,
        target: Uuid,
        at: DateTime<Utc>,
    ) -> CoreResult<MatchOutcome> {
        let forward = self
            .db
            .get_interaction(actor, target)
            .map_err(CoreError::store)?;
        let reverse = self
            .db
            .get_interaction(target, actor)
            .map_err(CoreError::store)?;

        let mutual = forward.is_some_and(|i| i.kind.is_positive())
            && reverse.is_some_and(|i| i.kind.is_positive());
        if !mutual {
            return Ok(MatchOutcome::no_match());
        }

        let (m, activation) = self
            .db
            .activate_match(Uuid::new_v4(), Uuid::new_v4(), actor, target, at)
            .map_err(CoreError::store)?;

        if activation != MatchActivation::AlreadyActive {
            info!(
                "match {} for ({}, {}) [{:?}]",
                m.id, m.user_a, m.user_b, activation
            );

            let event = GatewayEvent::MatchCreate {
                match_id: m.id,
                room_id: m.room_id,
                user_a: m.user_a,
                user_b: m.user_b,
            };
            self.dispatcher.send_to_user(m.user_a, event.clone());
            self.dispatcher.send_to_user(m.user_b, event);

            self.notifier.notify_match(actor, target, m.id);
            self.notifier.notify_match(target, actor, m.id);
        }

        Ok(MatchOutcome {
            is_match: true,
            match_id: Some(m.id),
            room_id: Some(m.room_id),
        })
    }
}
