//! Liveness endpoint.

use axum::http::StatusCode;

/// Always 200 with an empty body; never touches the database.
pub async fn health() -> StatusCode {
    StatusCode::OK
}
