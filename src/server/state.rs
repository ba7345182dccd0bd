use std::sync::Arc;

use crate::config::Settings;
use crate::postgres::PostgresPool;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub pool: PostgresPool,
}

impl AppState {
    pub fn new(settings: Settings, pool: PostgresPool) -> Self {
        Self {
            settings: Arc::new(settings),
            pool,
        }
    }
}
