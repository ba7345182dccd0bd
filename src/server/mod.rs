mod app;
pub mod middleware;
mod state;

pub use app::{create_app, with_middleware};
pub use state::AppState;
