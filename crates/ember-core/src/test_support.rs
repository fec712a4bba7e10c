//! Shared fixtures for ember-core unit tests.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use ember_db::Database;
use ember_types::models::SwipeKind;

use crate::notify::Notifier;

pub fn test_db() -> Arc<Database> {
    Arc::new(Database::open_in_memory().expect("in-memory db"))
}

/// Create a free-tier user with the given starting credit balance.
pub fn seed_user(db: &Database, username: &str, credits: i64) -> Uuid {
    seed_user_with_tier(db, username, "free", credits)
}

pub fn seed_user_with_tier(db: &Database, username: &str, tier: &str, credits: i64) -> Uuid {
    let id = Uuid::new_v4();
    db.create_user(&id.to_string(), username, "hash", tier, Utc::now())
        .expect("create user");
    if credits > 0 {
        db.grant_credits(id, credits, "signup_grant", Utc::now())
            .expect("grant credits");
    }
    id
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyCall {
    Match { user_id: Uuid, counterpart_id: Uuid },
    Message { user_id: Uuid, sender_id: Uuid },
    Like { user_id: Uuid, sender_id: Uuid, kind: SwipeKind },
}

/// Notifier double that records every dispatch.
#[derive(Default)]
pub struct RecordingNotifier {
    pub calls: Mutex<Vec<NotifyCall>>,
}

impl RecordingNotifier {
    pub fn calls(&self) -> Vec<NotifyCall> {
        self.calls.lock().expect("notifier lock poisoned").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_match(&self, user_id: Uuid, counterpart_id: Uuid, _match_id: Uuid) {
        self.calls
            .lock()
            .expect("notifier lock poisoned")
            .push(NotifyCall::Match { user_id, counterpart_id });
    }

    fn notify_message(&self, user_id: Uuid, sender_id: Uuid, _preview: &str, _room_id: Uuid) {
        self.calls
            .lock()
            .expect("notifier lock poisoned")
            .push(NotifyCall::Message { user_id, sender_id });
    }

    fn notify_like(&self, user_id: Uuid, sender_id: Uuid, kind: SwipeKind) {
        self.calls
            .lock()
            .expect("notifier lock poisoned")
            .push(NotifyCall::Like { user_id, sender_id, kind });
    }
}
