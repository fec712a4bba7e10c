use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use ember_types::api::{Claims, SendMessageRequest};

use crate::auth::AppState;
use crate::status_of;

/// Maximum accepted message content length, in characters.
const MAX_CONTENT_CHARS: usize = 4000;

pub async fn send_message(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.content.is_empty() || req.content.chars().count() > MAX_CONTENT_CHARS {
        return Err(StatusCode::BAD_REQUEST);
    }

    let now = chrono::Utc::now();
    let st = state.clone();
    let message = tokio::task::spawn_blocking(move || {
        st.facade
            .send_message(room_id, claims.sub, req.kind, req.content, req.metadata, now)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(status_of)?;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let st = state.clone();
    let messages = tokio::task::spawn_blocking(move || st.facade.load_history(room_id, claims.sub))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(status_of)?;

    Ok(Json(messages))
}
