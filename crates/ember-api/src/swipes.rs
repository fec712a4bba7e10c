use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::error;

use ember_types::api::{Claims, SwipeRequest, SwipeResponse};

use crate::auth::AppState;
use crate::status_of;

pub async fn swipe(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SwipeRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let now = chrono::Utc::now();

    // Run blocking DB work off the async runtime
    let st = state.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        st.facade.swipe(claims.sub, req.target_id, req.kind, now)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(status_of)?;

    Ok(Json(SwipeResponse {
        matched: outcome.matched,
        match_id: outcome.match_id,
        room_id: outcome.room_id,
        buffered: outcome.buffered,
    }))
}
