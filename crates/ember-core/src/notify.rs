use tracing::info;
use uuid::Uuid;

use ember_types::models::{SwipeKind, UserTier};

/// Push-notification dispatch collaborator. Implementations are
/// fire-and-forget: failures are logged inside the implementation and never
/// surface to the operation that triggered them.
pub trait Notifier: Send + Sync {
    fn notify_match(&self, user_id: Uuid, counterpart_id: Uuid, match_id: Uuid);
    fn notify_message(&self, user_id: Uuid, sender_id: Uuid, preview: &str, room_id: Uuid);
    fn notify_like(&self, user_id: Uuid, sender_id: Uuid, kind: SwipeKind);
}

/// Whether the recipient should be told about an incoming swipe.
///
/// A superlike is always announced; a plain like only to privileged
/// recipients (free users discover it when they match). Dislikes are never
/// announced.
pub fn should_notify(kind: SwipeKind, recipient_tier: UserTier) -> bool {
    match kind {
        SwipeKind::Superlike => true,
        SwipeKind::Like => recipient_tier == UserTier::Plus,
        SwipeKind::Dislike => false,
    }
}

/// Default notifier: logs the dispatch. The real push pipeline is an
/// external collaborator wired in at the server boundary.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_match(&self, user_id: Uuid, counterpart_id: Uuid, match_id: Uuid) {
        info!("notify {}: matched with {} ({})", user_id, counterpart_id, match_id);
    }

    fn notify_message(&self, user_id: Uuid, sender_id: Uuid, preview: &str, room_id: Uuid) {
        info!(
            "notify {}: message from {} in {}: {}",
            user_id, sender_id, room_id, preview
        );
    }

    fn notify_like(&self, user_id: Uuid, sender_id: Uuid, kind: SwipeKind) {
        info!("notify {}: {} from {}", user_id, kind.as_str(), sender_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superlike_always_notifies() {
        assert!(should_notify(SwipeKind::Superlike, UserTier::Free));
        assert!(should_notify(SwipeKind::Superlike, UserTier::Plus));
    }

    #[test]
    fn plain_like_withheld_from_free_recipients() {
        assert!(!should_notify(SwipeKind::Like, UserTier::Free));
        assert!(should_notify(SwipeKind::Like, UserTier::Plus));
    }

    #[test]
    fn dislike_never_notifies() {
        assert!(!should_notify(SwipeKind::Dislike, UserTier::Free));
        assert!(!should_notify(SwipeKind::Dislike, UserTier::Plus));
    }
}
