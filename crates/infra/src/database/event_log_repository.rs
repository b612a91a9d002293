//! Append-only log of provider write outcomes.

use std::sync::Arc;

use async_trait::async_trait;
use calbridge_core::ports::EventLog;
use calbridge_domain::{
    CalbridgeError, ConfirmedEvent, EventStatus, ProviderKind, Result as DomainResult,
};
use chrono::{TimeZone, Utc};
use rusqlite::{params, Row};

use super::manager::{run_blocking, DatabaseManager};
use crate::errors::InfraError;

/// SQLite implementation of the event log port. Rows are never updated.
pub struct SqliteEventLog {
    db: Arc<DatabaseManager>,
}

impl SqliteEventLog {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }
}

fn map_event(row: &Row<'_>) -> rusqlite::Result<DomainResult<ConfirmedEvent>> {
    let provider: String = row.get(3)?;
    let status: String = row.get(8)?;
    let start_at: i64 = row.get(5)?;
    let end_at: i64 = row.get(6)?;

    Ok((|| {
        let status = match status.as_str() {
            "created" => EventStatus::Created,
            "failed" => EventStatus::Failed,
            "cancelled" => EventStatus::Cancelled,
            other => {
                return Err(CalbridgeError::Storage(format!("unknown event status: {other}")))
            }
        };
        Ok(ConfirmedEvent {
            external_event_id: row.get(1).map_err(|e| CalbridgeError::Storage(e.to_string()))?,
            calendar_id: row.get(2).map_err(|e| CalbridgeError::Storage(e.to_string()))?,
            provider: ProviderKind::parse(&provider)
                .ok_or_else(|| CalbridgeError::Storage(format!("unknown provider: {provider}")))?,
            title: row.get(4).map_err(|e| CalbridgeError::Storage(e.to_string()))?,
            start: Utc
                .timestamp_opt(start_at, 0)
                .single()
                .ok_or_else(|| CalbridgeError::Storage("invalid start timestamp".into()))?,
            end: Utc
                .timestamp_opt(end_at, 0)
                .single()
                .ok_or_else(|| CalbridgeError::Storage("invalid end timestamp".into()))?,
            html_link: row.get(7).map_err(|e| CalbridgeError::Storage(e.to_string()))?,
            status,
        })
    })())
}

#[async_trait]
impl EventLog for SqliteEventLog {
    async fn record(&self, user_id: &str, event: &ConfirmedEvent) -> DomainResult<()> {
        let user_id = user_id.to_string();
        let event = event.clone();
        run_blocking(Arc::clone(&self.db), move |conn| {
            conn.execute(
                "INSERT INTO confirmed_events
                     (user_id, external_event_id, calendar_id, provider, title,
                      start_at, end_at, html_link, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    user_id,
                    event.external_event_id,
                    event.calendar_id,
                    event.provider.as_str(),
                    event.title,
                    event.start.timestamp(),
                    event.end.timestamp(),
                    event.html_link,
                    event.status.as_str(),
                    Utc::now().timestamp()
                ],
            )
            .map_err(InfraError::from)?;
            Ok(())
        })
        .await
    }

    async fn list_for_user(&self, user_id: &str, limit: usize) -> DomainResult<Vec<ConfirmedEvent>> {
        let user_id = user_id.to_string();
        run_blocking(Arc::clone(&self.db), move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT user_id, external_event_id, calendar_id, provider, title,
                            start_at, end_at, html_link, status
                     FROM confirmed_events
                     WHERE user_id = ?1
                     ORDER BY created_at DESC
                     LIMIT ?2",
                )
                .map_err(InfraError::from)?;

            let rows = stmt
                .query_map(params![user_id, limit as i64], map_event)
                .map_err(InfraError::from)?;

            let mut events = Vec::new();
            for row in rows {
                events.push(row.map_err(InfraError::from)??);
            }
            Ok(events)
        })
        .await
    }
}
