use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::notify::Outbox;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub outbox: Outbox,
}

impl AppState {
    pub fn new(conn: Connection, config: AppConfig, outbox: Outbox) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            config,
            outbox,
        }
    }

    /// A panicked handler leaves SQLite consistent (its transaction rolled back), so a
    /// poisoned lock is still usable.
    pub fn db(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
