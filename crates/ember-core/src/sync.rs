use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use ember_db::Database;
use ember_gateway::dispatcher::Dispatcher;
use ember_types::events::GatewayEvent;
use ember_types::models::{Message, MessageKind};

use crate::credits::CreditGate;
use crate::error::{CoreError, CoreResult};
use crate::notify::Notifier;
use crate::visibility::require_participant;

/// Synchronizes a room's messages: history load, live feed, read receipts,
/// gated sends and per-viewer deletion boundaries.
pub struct SyncService {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    notifier: Arc<dyn Notifier>,
    credits: CreditGate,
}

/// A room opened for viewing: the history snapshot plus the live feed. The
/// feed was subscribed before the snapshot was read, so nothing falls into
/// the gap between the two; anything delivered twice is deduplicated.
pub struct RoomOpen {
    pub history: Vec<Message>,
    pub feed: RoomFeed,
}

impl SyncService {
    pub fn new(
        db: Arc<Database>,
        dispatcher: Dispatcher,
        notifier: Arc<dyn Notifier>,
        credits: CreditGate,
    ) -> Self {
        Self {
            db,
            dispatcher,
            notifier,
            credits,
        }
    }

    /// The room's messages as the viewer is allowed to see them: nothing at
    /// or before their personal deletion boundary, and nothing at all while
    /// the room is hidden for them (the rows still exist for the other
    /// participant either way).
    pub fn load_history(&self, room_id: Uuid, viewer_id: Uuid) -> CoreResult<Vec<Message>> {
        require_participant(&self.db, room_id, viewer_id)?;

        if self
            .db
            .is_room_hidden(room_id, viewer_id)
            .map_err(CoreError::store)?
        {
            return Ok(Vec::new());
        }

        let boundary = self
            .db
            .deletion_boundary(room_id, viewer_id)
            .map_err(CoreError::store)?;

        self.db
            .room_messages(room_id, boundary)
            .map_err(CoreError::store)
    }

    /// History plus live feed, in the order that leaves no gap: subscribe
    /// first, then load, then let the feed drop anything the snapshot
    /// already contained.
    pub fn open_room(&self, room_id: Uuid, viewer_id: Uuid) -> CoreResult<RoomOpen> {
        let rx = self.dispatcher.subscribe();
        let history = self.load_history(room_id, viewer_id)?;

        let seen = history.iter().map(|m| m.id).collect();
        Ok(RoomOpen {
            history,
            feed: RoomFeed {
                room_id,
                rx,
                seen,
            },
        })
    }

    /// Accept a message for send:
    /// 1. charge the credit gate (chargeable kinds only) — a rejection
    ///    aborts with zero side effects;
    /// 2. sending into a room the sender had hidden restores it;
    /// 3. persist the message with the sender already in its read-by set;
    /// 4. fan out to the gateway and the push collaborator, best-effort.
    pub fn send(
        &self,
        room_id: Uuid,
        sender_id: Uuid,
        kind: MessageKind,
        content: String,
        metadata: Option<serde_json::Value>,
        at: DateTime<Utc>,
    ) -> CoreResult<Message> {
        require_participant(&self.db, room_id, sender_id)?;

        let sender_name = self
            .db
            .get_username_by_id(&sender_id.to_string())
            .map_err(CoreError::store)?
            .ok_or(CoreError::NotFound("user"))?;

        if kind.is_chargeable() {
            let decision = self.credits.check_and_decrement(sender_id, at)?;
            if !decision.allowed {
                return Err(CoreError::InsufficientCredit {
                    balance: decision.balance,
                });
            }
        }

        // Sending implies "I want this conversation back"
        if self
            .db
            .is_room_hidden(room_id, sender_id)
            .map_err(CoreError::store)?
        {
            self.db
                .unhide_room(room_id, sender_id)
                .map_err(CoreError::store)?;
        }

        let message = Message {
            id: Uuid::new_v4(),
            room_id,
            sender_id,
            sender_name,
            kind,
            content,
            metadata,
            created_at: at,
            read_by: vec![sender_id],
        };

        self.db
            .insert_message(
                message.id,
                room_id,
                sender_id,
                kind,
                &message.content,
                message.metadata.as_ref(),
                at,
            )
            .map_err(CoreError::store)?;

        // The write is the durable fact; everything below is best-effort
        self.dispatcher.broadcast(GatewayEvent::MessageCreate {
            id: message.id,
            room_id,
            sender_id,
            sender_name: message.sender_name.clone(),
            kind,
            content: message.content.clone(),
            metadata: message.metadata.clone(),
            created_at: at,
        });

        match self.db.other_participant(room_id, sender_id) {
            Ok(Some((counterpart_id, _))) => {
                self.notifier
                    .notify_message(counterpart_id, sender_id, &message.preview(), room_id);
            }
            Ok(None) => {}
            Err(e) => warn!("delivery notification skipped for {}: {}", room_id, e),
        }

        Ok(message)
    }

    /// Add the reader to one message's read-by set. A no-op (false) when the
    /// reader is the sender or already present; retries converge.
    pub fn mark_read(&self, message_id: Uuid, reader_id: Uuid, at: DateTime<Utc>) -> CoreResult<bool> {
        let (room_id, sender_id) = self
            .db
            .message_meta(message_id)
            .map_err(CoreError::store)?
            .ok_or(CoreError::NotFound("message"))?;

        require_participant(&self.db, room_id, reader_id)?;

        if sender_id == reader_id {
            return Ok(false);
        }

        let newly = self
            .db
            .mark_read(message_id, reader_id, at)
            .map_err(CoreError::store)?;

        if newly {
            self.dispatcher.broadcast(GatewayEvent::MessageRead {
                room_id,
                reader_id,
                message_ids: vec![message_id],
            });
        }
        Ok(newly)
    }

    /// Mark every message in the room not authored by the reader as read.
    /// Returns the newly read ids.
    pub fn mark_room_read(
        &self,
        room_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> CoreResult<Vec<Uuid>> {
        require_participant(&self.db, room_id, reader_id)?;

        let newly_read = self
            .db
            .mark_room_read(room_id, reader_id, at)
            .map_err(CoreError::store)?;

        if !newly_read.is_empty() {
            self.dispatcher.broadcast(GatewayEvent::MessageRead {
                room_id,
                reader_id,
                message_ids: newly_read.clone(),
            });
        }
        Ok(newly_read)
    }

    /// Raise the viewer's personal deletion boundary. Local bookkeeping
    /// only: no message row is mutated and no other participant is affected.
    pub fn delete_for_viewer(
        &self,
        room_id: Uuid,
        viewer_id: Uuid,
        up_to: DateTime<Utc>,
    ) -> CoreResult<()> {
        require_participant(&self.db, room_id, viewer_id)?;

        self.db
            .raise_deletion_boundary(room_id, viewer_id, up_to)
            .map_err(CoreError::store)
    }
}

/// Live message feed for one room. Surfaces each message exactly once: a
/// message that arrives both through the subscription and through the
/// sender's own optimistic insert (or the history snapshot) is dropped the
/// second time.
pub struct RoomFeed {
    room_id: Uuid,
    rx: broadcast::Receiver<GatewayEvent>,
    seen: HashSet<Uuid>,
}

impl RoomFeed {
    /// Next unseen message in this room. `None` once the dispatcher is gone.
    pub async fn next(&mut self) -> Option<Message> {
        loop {
            match self.rx.recv().await {
                Ok(GatewayEvent::MessageCreate {
                    id,
                    room_id,
                    sender_id,
                    sender_name,
                    kind,
                    content,
                    metadata,
                    created_at,
                }) if room_id == self.room_id => {
                    if !self.seen.insert(id) {
                        continue; // already surfaced
                    }
                    return Some(Message {
                        id,
                        room_id,
                        sender_id,
                        sender_name,
                        kind,
                        content,
                        metadata,
                        created_at,
                        read_by: vec![sender_id],
                    });
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("room feed for {} lagged by {} events", self.room_id, n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Record a locally inserted message (the optimistic path) so the
    /// subscription's copy is recognized as a duplicate. Returns false if it
    /// was already known.
    pub fn note_local(&mut self, message_id: Uuid) -> bool {
        self.seen.insert(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ember_types::models::SwipeKind;

    use crate::test_support::{NotifyCall, RecordingNotifier, seed_user, test_db};

    struct Fixture {
        db: Arc<Database>,
        notifier: Arc<RecordingNotifier>,
        sync: SyncService,
        a: Uuid,
        b: Uuid,
        room: Uuid,
    }

    fn fixture(credits_a: i64) -> Fixture {
        let db = test_db();
        let dispatcher = Dispatcher::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let sync = SyncService::new(
            db.clone(),
            dispatcher.clone(),
            notifier.clone(),
            CreditGate::new(db.clone()),
        );

        let a = seed_user(&db, "ana", credits_a);
        let b = seed_user(&db, "ben", 10);
        db.upsert_interaction(a, b, SwipeKind::Like, Utc::now()).unwrap();
        db.upsert_interaction(b, a, SwipeKind::Like, Utc::now()).unwrap();
        let (m, _) = db
            .activate_match(Uuid::new_v4(), Uuid::new_v4(), a, b, Utc::now())
            .unwrap();

        Fixture {
            db,
            notifier,
            sync,
            a,
            b,
            room: m.room_id,
        }
    }

    #[test]
    fn sender_is_in_read_by_at_creation() {
        let f = fixture(5);

        let msg = f
            .sync
            .send(f.room, f.a, MessageKind::Text, "hey".into(), None, Utc::now())
            .unwrap();
        assert_eq!(msg.read_by, vec![f.a]);

        let history = f.sync.load_history(f.room, f.b).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].read_by.contains(&f.a));
    }

    #[test]
    fn insufficient_credit_leaves_zero_side_effects() {
        let f = fixture(0);
        f.db.hide_room(f.room, f.a, Utc::now()).unwrap();

        let result = f
            .sync
            .send(f.room, f.a, MessageKind::Text, "hi".into(), None, Utc::now());
        assert!(matches!(result, Err(CoreError::InsufficientCredit { balance: 0 })));

        // No message row, room still hidden, nothing notified
        assert!(f.sync.load_history(f.room, f.b).unwrap().is_empty());
        assert!(f.db.is_room_hidden(f.room, f.a).unwrap());
        assert!(f.notifier.calls().is_empty());
    }

    #[test]
    fn gift_bypasses_the_credit_gate() {
        let f = fixture(0);

        let msg = f
            .sync
            .send(f.room, f.a, MessageKind::Gift, "🌹".into(), None, Utc::now());
        assert!(msg.is_ok());
        assert_eq!(f.db.credit_balance(f.a).unwrap(), 0);
    }

    #[test]
    fn sending_into_a_hidden_room_restores_it() {
        let f = fixture(5);
        f.db.hide_room(f.room, f.a, Utc::now()).unwrap();

        f.sync
            .send(f.room, f.a, MessageKind::Text, "back".into(), None, Utc::now())
            .unwrap();

        assert!(!f.db.is_room_hidden(f.room, f.a).unwrap());
    }

    #[test]
    fn send_charges_exactly_one_credit_and_notifies_counterpart() {
        let f = fixture(2);

        f.sync
            .send(f.room, f.a, MessageKind::Text, "hey".into(), None, Utc::now())
            .unwrap();

        assert_eq!(f.db.credit_balance(f.a).unwrap(), 1);
        assert_eq!(
            f.notifier.calls(),
            vec![NotifyCall::Message {
                user_id: f.b,
                sender_id: f.a
            }]
        );
    }

    #[test]
    fn deletion_boundary_is_asymmetric() {
        let f = fixture(5);
        let t0 = Utc::now();

        f.sync
            .send(f.room, f.a, MessageKind::Text, "old".into(), None, t0)
            .unwrap();
        f.sync
            .delete_for_viewer(f.room, f.b, t0 + Duration::seconds(1))
            .unwrap();
        f.sync
            .send(f.room, f.a, MessageKind::Text, "new".into(), None, t0 + Duration::seconds(2))
            .unwrap();

        let b_view = f.sync.load_history(f.room, f.b).unwrap();
        assert_eq!(b_view.len(), 1);
        assert_eq!(b_view[0].content, "new");

        // The sender's own view is unaffected
        let a_view = f.sync.load_history(f.room, f.a).unwrap();
        assert_eq!(a_view.len(), 2);
    }

    #[test]
    fn hidden_room_shows_no_history_at_all() {
        let f = fixture(5);
        f.sync
            .send(f.room, f.a, MessageKind::Text, "hey".into(), None, Utc::now())
            .unwrap();

        f.db.hide_room(f.room, f.b, Utc::now()).unwrap();
        assert!(f.sync.load_history(f.room, f.b).unwrap().is_empty());

        f.db.unhide_room(f.room, f.b).unwrap();
        assert_eq!(f.sync.load_history(f.room, f.b).unwrap().len(), 1);
    }

    #[test]
    fn mark_read_is_a_noop_for_the_sender_and_idempotent() {
        let f = fixture(5);
        let msg = f
            .sync
            .send(f.room, f.a, MessageKind::Text, "hey".into(), None, Utc::now())
            .unwrap();

        assert!(!f.sync.mark_read(msg.id, f.a, Utc::now()).unwrap());
        assert!(f.sync.mark_read(msg.id, f.b, Utc::now()).unwrap());
        assert!(!f.sync.mark_read(msg.id, f.b, Utc::now()).unwrap());

        let history = f.sync.load_history(f.room, f.a).unwrap();
        let mut read_by = history[0].read_by.clone();
        read_by.sort();
        let mut expected = vec![f.a, f.b];
        expected.sort();
        assert_eq!(read_by, expected);
    }

    #[test]
    fn mark_room_read_skips_own_messages() {
        let f = fixture(5);
        f.sync
            .send(f.room, f.a, MessageKind::Text, "one".into(), None, Utc::now())
            .unwrap();
        f.sync
            .send(f.room, f.a, MessageKind::Text, "two".into(), None, Utc::now())
            .unwrap();
        let own = f
            .sync
            .send(f.room, f.b, MessageKind::Text, "mine".into(), None, Utc::now())
            .unwrap();

        let newly = f.sync.mark_room_read(f.room, f.b, Utc::now()).unwrap();
        assert_eq!(newly.len(), 2);
        assert!(!newly.contains(&own.id));

        // Second pass finds nothing left
        assert!(f.sync.mark_room_read(f.room, f.b, Utc::now()).unwrap().is_empty());
        assert_eq!(f.db.unread_count(f.room, f.b, None).unwrap(), 0);
    }

    #[tokio::test]
    async fn offline_catch_up_observes_each_message_exactly_once() {
        let f = fixture(5);

        // A sends 3 messages while B is offline
        let t0 = Utc::now();
        for (i, text) in ["one", "two", "three"].iter().enumerate() {
            f.sync
                .send(
                    f.room,
                    f.a,
                    MessageKind::Text,
                    text.to_string(),
                    None,
                    t0 + Duration::milliseconds(i as i64),
                )
                .unwrap();
        }

        // B connects: load-then-subscribe through open_room
        let mut open = f.sync.open_room(f.room, f.b).unwrap();
        assert_eq!(open.history.len(), 3);

        // A fourth message arrives live
        let live = f
            .sync
            .send(
                f.room,
                f.a,
                MessageKind::Text,
                "four".into(),
                None,
                t0 + Duration::seconds(1),
            )
            .unwrap();

        let delivered = open.feed.next().await.unwrap();
        assert_eq!(delivered.id, live.id);

        // Nothing from the snapshot is re-delivered and nothing is pending
        let pending = tokio::time::timeout(std::time::Duration::from_millis(50), open.feed.next()).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn feed_drops_the_optimistic_duplicate() {
        let f = fixture(5);

        let mut open = f.sync.open_room(f.room, f.a).unwrap();

        // The sender inserts optimistically, then the subscription copy lands
        let msg = f
            .sync
            .send(f.room, f.a, MessageKind::Text, "hey".into(), None, Utc::now())
            .unwrap();
        assert!(open.feed.note_local(msg.id));

        let pending = tokio::time::timeout(std::time::Duration::from_millis(50), open.feed.next()).await;
        assert!(pending.is_err(), "subscription copy must be deduplicated");
    }

    #[tokio::test]
    async fn no_message_falls_into_the_open_room_gap() {
        let f = fixture(5);

        // open_room on an empty room, then a message lands: it must appear on
        // the feed (not be lost between snapshot and subscription)
        let mut open = f.sync.open_room(f.room, f.b).unwrap();
        assert!(open.history.is_empty());

        let msg = f
            .sync
            .send(f.room, f.a, MessageKind::Text, "gap".into(), None, Utc::now())
            .unwrap();

        let delivered = open.feed.next().await.unwrap();
        assert_eq!(delivered.id, msg.id);
    }
}
