use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use ember_types::events::GatewayEvent;

/// Manages all connected clients and broadcasts events.
///
/// Locking is std::sync (held only for map access, never across awaits) so
/// the coordination core can publish events from blocking contexts.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for gateway events — all connected clients receive
    /// all events; room-scoped events are filtered per connection against
    /// its subscriptions
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Track online users: user_id -> username
    online_users: RwLock<HashMap<Uuid, String>>,

    /// Per-user targeted send channels: user_id -> (conn_id, sender)
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                online_users: RwLock::new(HashMap::new()),
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a per-user targeted channel. Returns (conn_id, receiver).
    pub fn register_user_channel(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.user_channels_mut().insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Unregister a per-user targeted channel, but only if conn_id matches.
    pub fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.user_channels_mut();
        if let Some((stored_conn_id, _)) = channels.get(&user_id) {
            if *stored_conn_id == conn_id {
                channels.remove(&user_id);
            }
        }
    }

    /// Send a targeted event to a specific user. Fire-and-forget: offline
    /// users simply miss it.
    pub fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let channels = self
            .inner
            .user_channels
            .read()
            .expect("user channel lock poisoned");
        if let Some((_, tx)) = channels.get(&user_id) {
            let _ = tx.send(event);
        }
    }

    /// Register a user as online.
    pub fn user_online(&self, user_id: Uuid, username: String) {
        self.inner
            .online_users
            .write()
            .expect("online user lock poisoned")
            .insert(user_id, username.clone());

        self.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            username,
            online: true,
        });
    }

    /// Register a user as offline. Only cleans up if conn_id matches.
    pub fn user_offline(&self, user_id: Uuid, conn_id: Uuid) {
        // Only clean up if this connection still owns the user channel
        let is_current = {
            let channels = self
                .inner
                .user_channels
                .read()
                .expect("user channel lock poisoned");
            channels.get(&user_id).map_or(false, |(cid, _)| *cid == conn_id)
        };

        if !is_current {
            // A newer connection has taken over — don't touch anything
            return;
        }

        let username = self
            .inner
            .online_users
            .write()
            .expect("online user lock poisoned")
            .remove(&user_id)
            .unwrap_or_default();

        self.unregister_user_channel(user_id, conn_id);

        self.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            username,
            online: false,
        });
    }

    /// Get list of online users.
    pub fn online_users(&self) -> Vec<(Uuid, String)> {
        self.inner
            .online_users
            .read()
            .expect("online user lock poisoned")
            .iter()
            .map(|(id, name)| (*id, name.clone()))
            .collect()
    }

    fn user_channels_mut(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>
    {
        self.inner
            .user_channels
            .write()
            .expect("user channel lock poisoned")
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
