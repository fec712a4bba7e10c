use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub tier: UserTier,
    pub created_at: DateTime<Utc>,
}

/// Recipient privilege tier. Gates which swipe notifications a user receives.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserTier {
    Free,
    Plus,
}

impl UserTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserTier::Free => "free",
            UserTier::Plus => "plus",
        }
    }
}

impl std::str::FromStr for UserTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "free" => Ok(UserTier::Free),
            "plus" => Ok(UserTier::Plus),
            _ => Err(anyhow::anyhow!("Invalid user tier: {}", s)),
        }
    }
}

/// One directional swipe outcome from one user toward another.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SwipeKind {
    Like,
    Dislike,
    Superlike,
}

impl SwipeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwipeKind::Like => "like",
            SwipeKind::Dislike => "dislike",
            SwipeKind::Superlike => "superlike",
        }
    }

    /// A positive swipe is one that can form half of a match.
    pub fn is_positive(&self) -> bool {
        matches!(self, SwipeKind::Like | SwipeKind::Superlike)
    }
}

impl std::str::FromStr for SwipeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "like" => Ok(SwipeKind::Like),
            "dislike" => Ok(SwipeKind::Dislike),
            "superlike" => Ok(SwipeKind::Superlike),
            _ => Err(anyhow::anyhow!("Invalid swipe kind: {}", s)),
        }
    }
}

/// A recorded (actor, target) interaction. One row per directed pair; a
/// re-swipe overwrites `kind` in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub actor_id: Uuid,
    pub target_id: Uuid,
    pub kind: SwipeKind,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Active,
    Inactive,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Active => "active",
            MatchStatus::Inactive => "inactive",
        }
    }
}

impl std::str::FromStr for MatchStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(MatchStatus::Active),
            "inactive" => Ok(MatchStatus::Inactive),
            _ => Err(anyhow::anyhow!("Invalid match status: {}", s)),
        }
    }
}

/// A mutual match. `user_a`/`user_b` are the normalized unordered pair
/// (`user_a <= user_b`); the pair, not the row id, is the dedup key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: Uuid,
    pub user_a: Uuid,
    pub user_b: Uuid,
    pub room_id: Uuid,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persistent container for a conversation. Never hard-deleted; per-user
/// visibility is tracked separately as a hidden-for set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Audio,
    Gift,
    Info,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Audio => "audio",
            MessageKind::Gift => "gift",
            MessageKind::Info => "info",
        }
    }

    /// Whether a send of this kind consumes a message credit. Gifts draw on
    /// a separate pool; info messages are system-generated.
    pub fn is_chargeable(&self) -> bool {
        matches!(self, MessageKind::Text | MessageKind::Image | MessageKind::Audio)
    }
}

impl std::str::FromStr for MessageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "audio" => Ok(MessageKind::Audio),
            "gift" => Ok(MessageKind::Gift),
            "info" => Ok(MessageKind::Info),
            _ => Err(anyhow::anyhow!("Invalid message kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub kind: MessageKind,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    /// Users who have acknowledged this message. The sender is always a
    /// member from the moment of creation.
    pub read_by: Vec<Uuid>,
}

impl Message {
    /// Short human-readable preview for room lists and push notifications.
    pub fn preview(&self) -> String {
        preview_text(self.kind, &self.content)
    }
}

/// Short human-readable preview for room lists and push notifications.
pub fn preview_text(kind: MessageKind, content: &str) -> String {
    match kind {
        MessageKind::Text | MessageKind::Info => {
            let mut p: String = content.chars().take(80).collect();
            if content.chars().count() > 80 {
                p.push('…');
            }
            p
        }
        MessageKind::Image => "Photo".to_string(),
        MessageKind::Audio => "Voice message".to_string(),
        MessageKind::Gift => "Gift".to_string(),
    }
}

/// One entry in a user's room list: the room plus the derived counterpart,
/// latest preview and unread count for that viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: Uuid,
    pub counterpart_id: Uuid,
    pub counterpart_name: String,
    pub last_message: Option<MessagePreview>,
    pub unread_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePreview {
    pub kind: MessageKind,
    pub preview: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub delta: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
