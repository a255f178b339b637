//! Responses produced by the server itself rather than by a registered service.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{protocol::ErrorResponse, RequestError};
use tracing::warn;

/// Render a [`RequestError`] as a JSON error body with the matching status.
pub fn error_response(err: &RequestError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse::from(err))).into_response()
}

/// Catch-all 404 handler for paths no gateway route claims.
pub async fn not_found() -> Response {
    error_response(&RequestError::NotFound(
        "the requested resource does not exist".into(),
    ))
}

/// Convert an engine-level service error into a 500 response.
///
/// The error text is logged, not returned to the client.
pub fn engine_failure(err: impl std::fmt::Display) -> Response {
    warn!(error = %err, "engine service error");
    error_response(&RequestError::Internal("request handling failed".into()))
}
