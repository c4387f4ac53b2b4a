use std::sync::Arc;

use crate::db::DbPool;
use crate::ws::ConnectionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// Live WebSocket connections and their subscription scopes
    pub registry: Arc<ConnectionRegistry>,
}

impl AppState {
    pub fn new(db: DbPool) -> Self {
        Self {
            db,
            registry: Arc::new(ConnectionRegistry::new()),
        }
    }
}
