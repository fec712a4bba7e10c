use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use ember_db::Database;
use ember_gateway::dispatcher::Dispatcher;
use ember_types::models::{MatchStatus, Message, MessageKind, RoomSummary, SwipeKind, UserTier};

use crate::credits::CreditGate;
use crate::error::{CoreError, CoreResult};
use crate::matches::MatchDetector;
use crate::notify::Notifier;
use crate::swipes::SwipeService;
use crate::sync::{RoomOpen, SyncService};
use crate::visibility::VisibilityService;

/// What a swipe produced, as reported back to the presentation layer.
#[derive(Debug, Clone, Copy)]
pub struct SwipeOutcome {
    pub matched: bool,
    pub match_id: Option<Uuid>,
    pub room_id: Option<Uuid>,
    /// True when the interaction write was buffered for replay instead of
    /// stored (the swipe flow itself never fails on a store outage).
    pub buffered: bool,
}

/// The single entry point the presentation layer talks to. Composes the
/// swipe store, match detector, visibility manager, message synchronizer
/// and credit gate; nothing underneath is called from outside.
pub struct ChatFacade {
    db: Arc<Database>,
    swipes: SwipeService,
    detector: MatchDetector,
    visibility: VisibilityService,
    sync: SyncService,
    credits: CreditGate,
}

impl ChatFacade {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher, notifier: Arc<dyn Notifier>) -> Self {
        let credits = CreditGate::new(db.clone());
        Self {
            swipes: SwipeService::new(db.clone(), notifier.clone()),
            detector: MatchDetector::new(db.clone(), dispatcher.clone(), notifier.clone()),
            visibility: VisibilityService::new(db.clone(), dispatcher.clone()),
            sync: SyncService::new(db.clone(), dispatcher, notifier, credits.clone()),
            credits,
            db,
        }
    }

    /// Record a swipe and derive the match, if this was the second half of a
    /// mutual positive pair. Positive swipes that were buffered during a
    /// store outage get their match check when the replay lands.
    pub fn swipe(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
        kind: SwipeKind,
        at: DateTime<Utc>,
    ) -> CoreResult<SwipeOutcome> {
        if actor_id == target_id {
            return Err(CoreError::BadRequest("cannot swipe on yourself"));
        }

        // The tier lookup rides the same store as the interaction write. If
        // the store is down the swipe must still go through (buffered), so a
        // failed lookup falls back to the most restrictive tier instead of
        // failing the swipe.
        let target_tier = match self.db.get_user_by_id(&target_id.to_string()) {
            Ok(Some(user)) => user.tier.parse().unwrap_or(UserTier::Free),
            Ok(None) => return Err(CoreError::NotFound("user")),
            Err(e) => {
                warn!("tier lookup for {} failed: {}", target_id, e);
                UserTier::Free
            }
        };

        let record = self.swipes.record(actor_id, target_id, kind, target_tier, at);

        let mut outcome = SwipeOutcome {
            matched: false,
            match_id: None,
            room_id: None,
            buffered: !record.stored,
        };

        if record.stored && kind.is_positive() {
            let m = self.detector.check_and_create(actor_id, target_id, at)?;
            outcome.matched = m.is_match;
            outcome.match_id = m.match_id;
            outcome.room_id = m.room_id;
        } else if record.stored {
            // A match is active iff both interactions are positive, so a
            // re-swipe to dislike invalidates an existing match
            if let Some(m) = self
                .db
                .get_match_by_pair(actor_id, target_id)
                .map_err(CoreError::store)?
            {
                if m.status == MatchStatus::Active {
                    self.db
                        .set_match_status(m.id, MatchStatus::Inactive, at)
                        .map_err(CoreError::store)?;
                    info!("match {} invalidated by {}", m.id, actor_id);
                }
            }
        }

        // Buffered swipes that landed in this call get their delayed check;
        // failures here never fail the swipe that triggered the replay
        for (actor, target, replayed_kind) in record.replayed {
            if replayed_kind.is_positive() {
                if let Err(e) = self.detector.check_and_create(actor, target, at) {
                    warn!("deferred match check {}->{} failed: {}", actor, target, e);
                }
            }
        }

        Ok(outcome)
    }

    pub fn send_message(
        &self,
        room_id: Uuid,
        sender_id: Uuid,
        kind: MessageKind,
        content: String,
        metadata: Option<serde_json::Value>,
        at: DateTime<Utc>,
    ) -> CoreResult<Message> {
        self.sync.send(room_id, sender_id, kind, content, metadata, at)
    }

    pub fn load_history(&self, room_id: Uuid, viewer_id: Uuid) -> CoreResult<Vec<Message>> {
        self.sync.load_history(room_id, viewer_id)
    }

    /// History snapshot plus live feed, subscribed without a gap.
    pub fn open_room(&self, room_id: Uuid, viewer_id: Uuid) -> CoreResult<RoomOpen> {
        self.sync.open_room(room_id, viewer_id)
    }

    pub fn mark_read(&self, message_id: Uuid, reader_id: Uuid, at: DateTime<Utc>) -> CoreResult<bool> {
        self.sync.mark_read(message_id, reader_id, at)
    }

    pub fn mark_room_read(
        &self,
        room_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> CoreResult<Vec<Uuid>> {
        self.sync.mark_room_read(room_id, reader_id, at)
    }

    pub fn hide_room(&self, room_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> CoreResult<()> {
        self.visibility.hide(room_id, user_id, at)
    }

    pub fn unhide_room(&self, room_id: Uuid, user_id: Uuid) -> CoreResult<()> {
        self.visibility.unhide(room_id, user_id)
    }

    pub fn list_visible_rooms(&self, viewer_id: Uuid) -> CoreResult<Vec<RoomSummary>> {
        self.visibility.list_visible(viewer_id)
    }

    pub fn delete_for_viewer(
        &self,
        room_id: Uuid,
        viewer_id: Uuid,
        up_to: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.sync.delete_for_viewer(room_id, viewer_id, up_to)
    }

    pub fn credit_balance(&self, user_id: Uuid) -> CoreResult<i64> {
        self.credits.balance(user_id)
    }

    pub fn grant_credits(
        &self,
        user_id: Uuid,
        amount: i64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> CoreResult<i64> {
        self.credits.grant(user_id, amount, reason, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::test_support::{RecordingNotifier, seed_user, test_db};

    fn facade(db: &Arc<Database>) -> ChatFacade {
        ChatFacade::new(
            db.clone(),
            Dispatcher::new(),
            Arc::new(RecordingNotifier::default()),
        )
    }

    #[test]
    fn mutual_likes_match_in_either_order() {
        let db = test_db();
        let facade = facade(&db);
        let a = seed_user(&db, "ana", 10);
        let b = seed_user(&db, "ben", 10);

        let first = facade.swipe(a, b, SwipeKind::Like, Utc::now()).unwrap();
        assert!(!first.matched);

        let second = facade.swipe(b, a, SwipeKind::Like, Utc::now()).unwrap();
        assert!(second.matched);
        let room = second.room_id.unwrap();

        // Both participants see the shared room
        assert_eq!(facade.list_visible_rooms(a).unwrap()[0].room_id, room);
        assert_eq!(facade.list_visible_rooms(b).unwrap()[0].room_id, room);
        assert_eq!(db.count_matches().unwrap(), 1);
    }

    #[test]
    fn swiping_yourself_is_rejected() {
        let db = test_db();
        let facade = facade(&db);
        let a = seed_user(&db, "ana", 0);

        assert!(matches!(
            facade.swipe(a, a, SwipeKind::Like, Utc::now()),
            Err(CoreError::BadRequest(_))
        ));
    }

    #[test]
    fn swiping_a_missing_user_is_not_found() {
        let db = test_db();
        let facade = facade(&db);
        let a = seed_user(&db, "ana", 0);

        assert!(matches!(
            facade.swipe(a, Uuid::new_v4(), SwipeKind::Like, Utc::now()),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn end_to_end_conversation_flow() {
        let db = test_db();
        let facade = facade(&db);
        let a = seed_user(&db, "ana", 5);
        let b = seed_user(&db, "ben", 5);

        facade.swipe(a, b, SwipeKind::Superlike, Utc::now()).unwrap();
        let outcome = facade.swipe(b, a, SwipeKind::Like, Utc::now()).unwrap();
        let room = outcome.room_id.unwrap();

        let t0 = Utc::now();
        facade
            .send_message(room, a, MessageKind::Text, "hi!".into(), None, t0)
            .unwrap();

        // B sees the unread message in the room list, then reads it
        let rooms = facade.list_visible_rooms(b).unwrap();
        assert_eq!(rooms[0].unread_count, 1);
        assert_eq!(rooms[0].last_message.as_ref().unwrap().preview, "hi!");

        facade.mark_room_read(room, b, t0 + Duration::seconds(1)).unwrap();
        assert_eq!(facade.list_visible_rooms(b).unwrap()[0].unread_count, 0);

        // B hides the room; A is unaffected
        facade.hide_room(room, b, t0 + Duration::seconds(2)).unwrap();
        assert!(facade.list_visible_rooms(b).unwrap().is_empty());
        assert_eq!(facade.list_visible_rooms(a).unwrap().len(), 1);

        // B replying restores the room for B
        facade
            .send_message(
                room,
                b,
                MessageKind::Text,
                "hey".into(),
                None,
                t0 + Duration::seconds(3),
            )
            .unwrap();
        assert_eq!(facade.list_visible_rooms(b).unwrap().len(), 1);

        // A clears the conversation locally; B keeps everything
        facade
            .delete_for_viewer(room, a, t0 + Duration::seconds(4))
            .unwrap();
        assert!(facade.load_history(room, a).unwrap().is_empty());
        assert_eq!(facade.load_history(room, b).unwrap().len(), 2);

        // One credit spent per chargeable send
        assert_eq!(facade.credit_balance(a).unwrap(), 4);
        assert_eq!(facade.credit_balance(b).unwrap(), 4);
    }

    #[test]
    fn dislike_re_swipe_invalidates_and_mutual_likes_reactivate() {
        let db = test_db();
        let facade = facade(&db);
        let a = seed_user(&db, "ana", 10);
        let b = seed_user(&db, "ben", 10);

        facade.swipe(a, b, SwipeKind::Like, Utc::now()).unwrap();
        let matched = facade.swipe(b, a, SwipeKind::Like, Utc::now()).unwrap();
        let match_id = matched.match_id.unwrap();

        // A changes their mind
        facade.swipe(a, b, SwipeKind::Dislike, Utc::now()).unwrap();
        let m = db.get_match_by_pair(a, b).unwrap().unwrap();
        assert_eq!(m.status, ember_types::models::MatchStatus::Inactive);

        // A comes back around: same match row and room, active again
        let again = facade.swipe(a, b, SwipeKind::Like, Utc::now()).unwrap();
        assert!(again.matched);
        assert_eq!(again.match_id, Some(match_id));
        assert_eq!(db.count_matches().unwrap(), 1);
    }

    #[test]
    fn rejected_send_reports_the_balance() {
        let db = test_db();
        let facade = facade(&db);
        let a = seed_user(&db, "ana", 10);
        let b = seed_user(&db, "ben", 0);

        facade.swipe(a, b, SwipeKind::Like, Utc::now()).unwrap();
        let outcome = facade.swipe(b, a, SwipeKind::Like, Utc::now()).unwrap();
        let room = outcome.room_id.unwrap();

        let result = facade.send_message(room, b, MessageKind::Text, "hi".into(), None, Utc::now());
        assert!(matches!(result, Err(CoreError::InsufficientCredit { balance: 0 })));
        assert!(facade.load_history(room, a).unwrap().is_empty());
    }
}
