use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MessageKind, SwipeKind};

// -- JWT Claims --

/// JWT claims shared across ember-api (REST middleware) and ember-gateway
/// (WebSocket authentication). Canonical definition lives here in ember-types
/// to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Swipes --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwipeRequest {
    pub target_id: Uuid,
    pub kind: SwipeKind,
}

#[derive(Debug, Serialize)]
pub struct SwipeResponse {
    pub matched: bool,
    pub match_id: Option<Uuid>,
    pub room_id: Option<Uuid>,
    /// True when the swipe was buffered for replay instead of stored.
    pub buffered: bool,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub kind: MessageKind,
    pub content: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

// -- Rooms --

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DeleteForMeRequest {
    /// Boundary timestamp; messages at or before it disappear for the caller.
    /// Defaults to the server's current time.
    #[serde(default)]
    pub up_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub marked: usize,
}

// -- Credits --

#[derive(Debug, Serialize)]
pub struct CreditBalanceResponse {
    pub amount: i64,
}
