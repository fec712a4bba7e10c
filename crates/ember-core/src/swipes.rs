use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use ember_db::Database;
use ember_types::models::{Interaction, SwipeKind, UserTier};

use crate::notify::{Notifier, should_notify};

/// Swipes buffered locally while the store is unreachable. A missed
/// interaction must never block the swipe flow, so the queue soaks up
/// transient failures and is replayed on the next write.
const PENDING_CAP: usize = 256;

/// Store seam for directional interactions. The swipe path is the one place
/// where writes are buffered through outages, so it is injected as a trait
/// and the replay logic is testable against a flaky double.
pub trait InteractionStore: Send + Sync {
    fn upsert(&self, actor: Uuid, target: Uuid, kind: SwipeKind, at: DateTime<Utc>)
    -> anyhow::Result<()>;

    fn get(&self, actor: Uuid, target: Uuid) -> anyhow::Result<Option<Interaction>>;
}

impl InteractionStore for Database {
    fn upsert(
        &self,
        actor: Uuid,
        target: Uuid,
        kind: SwipeKind,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.upsert_interaction(actor, target, kind, at)
    }

    fn get(&self, actor: Uuid, target: Uuid) -> anyhow::Result<Option<Interaction>> {
        self.get_interaction(actor, target)
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingSwipe {
    actor: Uuid,
    target: Uuid,
    kind: SwipeKind,
    at: DateTime<Utc>,
}

/// Result of one `record` call.
pub struct SwipeRecord {
    /// False when the write failed and the swipe was buffered instead.
    pub stored: bool,
    /// Previously buffered swipes whose writes landed during this call.
    /// The caller re-runs match detection for the positive ones.
    pub replayed: Vec<(Uuid, Uuid, SwipeKind)>,
}

pub struct SwipeService {
    store: Arc<dyn InteractionStore>,
    notifier: Arc<dyn Notifier>,
    pending: Mutex<VecDeque<PendingSwipe>>,
}

impl SwipeService {
    pub fn new(store: Arc<dyn InteractionStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Upsert the (actor, target) interaction. Retrying with the same inputs
    /// converges on the same row. Never fails outright: a store error
    /// buffers the swipe for replay instead.
    ///
    /// Side effect: a positive swipe triggers the like notification when the
    /// recipient's tier is eligible, whether the write landed or was
    /// buffered — the swipe is a fact from the actor's point of view.
    pub fn record(
        &self,
        actor: Uuid,
        target: Uuid,
        kind: SwipeKind,
        recipient_tier: UserTier,
        at: DateTime<Utc>,
    ) -> SwipeRecord {
        let replayed = self.replay_pending();

        let stored = match self.store.upsert(actor, target, kind, at) {
            Ok(()) => true,
            Err(e) => {
                warn!("interaction {}->{} buffered: {}", actor, target, e);
                self.buffer(PendingSwipe { actor, target, kind, at });
                false
            }
        };

        if kind.is_positive() && should_notify(kind, recipient_tier) {
            self.notifier.notify_like(target, actor, kind);
        }

        SwipeRecord { stored, replayed }
    }

    /// Attempt every buffered swipe in FIFO order, stopping at the first
    /// failure (the rest stay queued for the next call).
    pub fn replay_pending(&self) -> Vec<(Uuid, Uuid, SwipeKind)> {
        let mut replayed = Vec::new();
        loop {
            let next = {
                let queue = self.pending.lock().expect("pending queue lock poisoned");
                queue.front().copied()
            };
            let Some(swipe) = next else { break };

            match self
                .store
                .upsert(swipe.actor, swipe.target, swipe.kind, swipe.at)
            {
                Ok(()) => {
                    self.pending
                        .lock()
                        .expect("pending queue lock poisoned")
                        .pop_front();
                    replayed.push((swipe.actor, swipe.target, swipe.kind));
                }
                Err(e) => {
                    warn!("replay of {}->{} still failing: {}", swipe.actor, swipe.target, e);
                    break;
                }
            }
        }
        replayed
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("pending queue lock poisoned").len()
    }

    fn buffer(&self, swipe: PendingSwipe) {
        let mut queue = self.pending.lock().expect("pending queue lock poisoned");
        if queue.len() >= PENDING_CAP {
            // Shed the oldest entry; the cap bounds memory during long outages
            if let Some(dropped) = queue.pop_front() {
                warn!(
                    "pending swipe queue full, dropping {}->{}",
                    dropped.actor, dropped.target
                );
            }
        }
        queue.push_back(swipe);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::test_support::{NotifyCall, RecordingNotifier, seed_user, test_db};

    /// Store double whose writes fail while `down` is set.
    struct FlakyStore {
        inner: Arc<Database>,
        down: AtomicBool,
    }

    impl FlakyStore {
        fn new(inner: Arc<Database>) -> Self {
            Self {
                inner,
                down: AtomicBool::new(false),
            }
        }

        fn set_down(&self, down: bool) {
            self.down.store(down, Ordering::SeqCst);
        }
    }

    impl InteractionStore for FlakyStore {
        fn upsert(
            &self,
            actor: Uuid,
            target: Uuid,
            kind: SwipeKind,
            at: DateTime<Utc>,
        ) -> anyhow::Result<()> {
            if self.down.load(Ordering::SeqCst) {
                anyhow::bail!("store unreachable");
            }
            self.inner.upsert_interaction(actor, target, kind, at)
        }

        fn get(&self, actor: Uuid, target: Uuid) -> anyhow::Result<Option<Interaction>> {
            self.inner.get_interaction(actor, target)
        }
    }

    #[test]
    fn retry_with_same_inputs_converges() {
        let db = test_db();
        let a = seed_user(&db, "ana", 0);
        let b = seed_user(&db, "ben", 0);
        let service = SwipeService::new(db.clone(), Arc::new(RecordingNotifier::default()));

        for _ in 0..3 {
            let rec = service.record(a, b, SwipeKind::Like, UserTier::Free, Utc::now());
            assert!(rec.stored);
        }

        let stored = db.get_interaction(a, b).unwrap().unwrap();
        assert_eq!(stored.kind, SwipeKind::Like);
    }

    #[test]
    fn outage_buffers_and_replays_in_order() {
        let db = test_db();
        let a = seed_user(&db, "ana", 0);
        let b = seed_user(&db, "ben", 0);
        let c = seed_user(&db, "cat", 0);

        let flaky = Arc::new(FlakyStore::new(db.clone()));
        let service = SwipeService::new(flaky.clone(), Arc::new(RecordingNotifier::default()));

        flaky.set_down(true);
        let rec = service.record(a, b, SwipeKind::Like, UserTier::Free, Utc::now());
        assert!(!rec.stored);
        assert_eq!(service.pending_len(), 1);
        assert!(db.get_interaction(a, b).unwrap().is_none());

        // Store comes back; the next swipe replays the buffered one first
        flaky.set_down(false);
        let rec = service.record(a, c, SwipeKind::Like, UserTier::Free, Utc::now());
        assert!(rec.stored);
        assert_eq!(rec.replayed, vec![(a, b, SwipeKind::Like)]);
        assert_eq!(service.pending_len(), 0);
        assert!(db.get_interaction(a, b).unwrap().is_some());
    }

    #[test]
    fn superlike_notifies_free_recipient_but_like_does_not() {
        let db = test_db();
        let a = seed_user(&db, "ana", 0);
        let b = seed_user(&db, "ben", 0);
        let notifier = Arc::new(RecordingNotifier::default());
        let service = SwipeService::new(db.clone(), notifier.clone());

        service.record(a, b, SwipeKind::Like, UserTier::Free, Utc::now());
        assert!(notifier.calls().is_empty());

        service.record(a, b, SwipeKind::Superlike, UserTier::Free, Utc::now());
        assert_eq!(
            notifier.calls(),
            vec![NotifyCall::Like {
                user_id: b,
                sender_id: a,
                kind: SwipeKind::Superlike
            }]
        );
    }

    #[test]
    fn like_notifies_plus_recipient() {
        let db = test_db();
        let a = seed_user(&db, "ana", 0);
        let b = seed_user(&db, "ben", 0);
        let notifier = Arc::new(RecordingNotifier::default());
        let service = SwipeService::new(db.clone(), notifier.clone());

        service.record(a, b, SwipeKind::Like, UserTier::Plus, Utc::now());
        assert_eq!(notifier.calls().len(), 1);
    }
}
