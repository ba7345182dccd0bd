//! API layer - HTTP endpoint handlers.

mod diagnostics;
mod health;
mod routes;

pub use diagnostics::database_info;
pub use health::health;
pub use routes::{api_routes, DIAGNOSTIC_PATH, HEALTH_PATH};
