//! Pooled SQLite connection manager and schema bootstrap.

use std::sync::Arc;

use calbridge_domain::{CalbridgeError, DatabaseConfig, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::info;

use crate::errors::InfraError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS pending_sessions (
    session_key   TEXT PRIMARY KEY,
    payload_json  TEXT NOT NULL,
    state         TEXT NOT NULL,
    created_at    INTEGER NOT NULL,
    expires_at    INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS rate_counters (
    counter_key    TEXT PRIMARY KEY,
    count          INTEGER NOT NULL,
    window_ends_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS job_records (
    idempotency_key TEXT PRIMARY KEY,
    operation       TEXT NOT NULL,
    payload_json    TEXT NOT NULL,
    status          TEXT NOT NULL,
    attempt_count   INTEGER NOT NULL DEFAULT 0,
    last_error      TEXT,
    result_json     TEXT,
    next_attempt_at INTEGER NOT NULL,
    created_at      INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_job_records_due
    ON job_records (status, next_attempt_at);

CREATE TABLE IF NOT EXISTS provider_credentials (
    user_id     TEXT NOT NULL,
    provider    TEXT NOT NULL,
    blob        TEXT NOT NULL,
    expires_at  INTEGER,
    refreshable INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, provider)
);

CREATE TABLE IF NOT EXISTS calendar_handles (
    user_id      TEXT NOT NULL,
    provider     TEXT NOT NULL,
    external_id  TEXT NOT NULL,
    display_name TEXT NOT NULL,
    is_primary   INTEGER NOT NULL DEFAULT 0,
    is_enabled   INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (user_id, provider, external_id)
);

CREATE TABLE IF NOT EXISTS confirmed_events (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id           TEXT NOT NULL,
    external_event_id TEXT NOT NULL,
    calendar_id       TEXT NOT NULL,
    provider          TEXT NOT NULL,
    title             TEXT NOT NULL,
    start_at          INTEGER NOT NULL,
    end_at            INTEGER NOT NULL,
    html_link         TEXT,
    status            TEXT NOT NULL,
    created_at        INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_confirmed_events_user
    ON confirmed_events (user_id, created_at);
";

/// Shared handle on the pooled database.
pub struct DatabaseManager {
    pool: Pool<SqliteConnectionManager>,
}

impl DatabaseManager {
    /// Open (creating if needed) the database at the configured path and
    /// apply the schema.
    pub fn open(config: &DatabaseConfig) -> Result<Arc<Self>> {
        let manager = SqliteConnectionManager::file(&config.path).with_init(init_connection);
        Self::build(manager, config.pool_size)
    }

    /// In-memory database for tests. Pool size is pinned to one connection
    /// so every caller sees the same memory database.
    pub fn open_in_memory() -> Result<Arc<Self>> {
        let manager = SqliteConnectionManager::memory().with_init(init_connection);
        Self::build(manager, 1)
    }

    fn build(manager: SqliteConnectionManager, pool_size: u32) -> Result<Arc<Self>> {
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(InfraError::from)?;

        let conn = pool.get().map_err(InfraError::from)?;
        conn.execute_batch(SCHEMA).map_err(InfraError::from)?;
        drop(conn);

        info!(pool_size = pool_size.max(1), "database opened");
        Ok(Arc::new(Self { pool }))
    }

    /// Borrow a pooled connection.
    pub fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| InfraError::from(e).into())
    }
}

fn init_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}

/// Run a blocking database closure on the tokio blocking pool.
pub(crate) async fn run_blocking<T, F>(db: Arc<DatabaseManager>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut rusqlite::Connection) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = db.conn()?;
        f(&mut conn)
    })
    .await
    .map_err(|e| CalbridgeError::Internal(format!("database task join failed: {e}")))?
}
