/// Database row types — these map directly to SQLite rows.
/// Distinct from ember-types domain models to keep the DB layer independent.
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub tier: String,
    pub created_at: String,
}

/// One row of the viewer's room list, before previews and unread counts are
/// attached. `boundary` is the viewer's personal deletion boundary, if set.
pub struct RoomListRow {
    pub room_id: Uuid,
    pub counterpart_id: Uuid,
    pub counterpart_name: String,
    pub boundary: Option<DateTime<Utc>>,
}
