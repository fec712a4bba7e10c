use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use ember_types::api::{Claims, CreditBalanceResponse, DeleteForMeRequest, MarkReadResponse};

use crate::auth::AppState;
use crate::status_of;

pub async fn list_rooms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let st = state.clone();
    let rooms = tokio::task::spawn_blocking(move || st.facade.list_visible_rooms(claims.sub))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(status_of)?;

    Ok(Json(rooms))
}

pub async fn hide_room(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let now = chrono::Utc::now();
    let st = state.clone();
    tokio::task::spawn_blocking(move || st.facade.hide_room(room_id, claims.sub, now))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(status_of)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn unhide_room(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let st = state.clone();
    tokio::task::spawn_blocking(move || st.facade.unhide_room(room_id, claims.sub))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(status_of)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_room_read(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let now = chrono::Utc::now();
    let st = state.clone();
    let newly_read = tokio::task::spawn_blocking(move || {
        st.facade.mark_room_read(room_id, claims.sub, now)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(status_of)?;

    Ok(Json(MarkReadResponse {
        marked: newly_read.len(),
    }))
}

/// Clear the conversation for the caller only. The counterpart's history and
/// the stored messages are untouched.
pub async fn delete_for_me(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    req: Option<Json<DeleteForMeRequest>>,
) -> Result<impl IntoResponse, StatusCode> {
    let up_to = req
        .and_then(|Json(r)| r.up_to)
        .unwrap_or_else(chrono::Utc::now);

    let st = state.clone();
    tokio::task::spawn_blocking(move || st.facade.delete_for_viewer(room_id, claims.sub, up_to))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(status_of)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn credit_balance(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let st = state.clone();
    let amount = tokio::task::spawn_blocking(move || st.facade.credit_balance(claims.sub))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(status_of)?;

    Ok(Json(CreditBalanceResponse { amount }))
}
