pub mod auth;
pub mod messages;
pub mod middleware;
pub mod rooms;
pub mod swipes;

use axum::http::StatusCode;
use ember_core::CoreError;
use tracing::error;

/// Map a core error to the HTTP status the presentation layer expects.
/// Transient store failures are logged and reported as retryable.
pub(crate) fn status_of(e: CoreError) -> StatusCode {
    match e {
        CoreError::TransientStore(inner) => {
            error!("store failure: {:#}", inner);
            StatusCode::SERVICE_UNAVAILABLE
        }
        CoreError::InsufficientCredit { .. } => StatusCode::PAYMENT_REQUIRED,
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::NotParticipant => StatusCode::FORBIDDEN,
        CoreError::BadRequest(_) => StatusCode::BAD_REQUEST,
    }
}
