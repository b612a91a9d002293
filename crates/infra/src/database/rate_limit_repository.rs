//! SQLite-backed rate counter store.
//!
//! The limiter embeds the window id in the counter key, so a rollover
//! naturally starts a new row; the single upsert statement keeps the
//! increment atomic, and stale windows are reaped opportunistically.

use std::sync::Arc;

use async_trait::async_trait;
use calbridge_core::ports::RateCounterStore;
use calbridge_domain::Result as DomainResult;
use chrono::Utc;
use rusqlite::params;

use super::manager::{run_blocking, DatabaseManager};
use crate::errors::InfraError;

/// SQLite implementation of the rate counter port.
pub struct SqliteRateCounterStore {
    db: Arc<DatabaseManager>,
}

impl SqliteRateCounterStore {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RateCounterStore for SqliteRateCounterStore {
    async fn incr(&self, counter_key: &str, window_secs: i64) -> DomainResult<u32> {
        let counter_key = counter_key.to_string();
        run_blocking(Arc::clone(&self.db), move |conn| {
            let now = Utc::now().timestamp();

            // Reap counters whose window has long ended.
            conn.execute(
                "DELETE FROM rate_counters WHERE window_ends_at <= ?1",
                params![now],
            )
            .map_err(InfraError::from)?;

            let count: u32 = conn
                .query_row(
                    "INSERT INTO rate_counters (counter_key, count, window_ends_at)
                     VALUES (?1, 1, ?2)
                     ON CONFLICT(counter_key) DO UPDATE SET count = count + 1
                     RETURNING count",
                    params![counter_key, now + window_secs],
                    |row| row.get(0),
                )
                .map_err(InfraError::from)?;

            Ok(count)
        })
        .await
    }
}
