use axum::{routing::get, Router};

use crate::server::AppState;

use super::diagnostics::database_info;
use super::health::health;

pub const HEALTH_PATH: &str = "/health";
pub const DIAGNOSTIC_PATH: &str = "/test";

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Liveness
        .route(HEALTH_PATH, get(health))
        // Database name and version
        .route(DIAGNOSTIC_PATH, get(database_info))
}
