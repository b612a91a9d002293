//! SQLite-backed pending-session store.
//!
//! The session record is the serialized `PendingSession`; the `state` and
//! `expires_at` columns are denormalized so the conditional transition can
//! run as one guarded statement inside an immediate transaction, which is
//! the atomic check-then-act the state machine relies on.

use std::sync::Arc;

use async_trait::async_trait;
use calbridge_core::ports::SessionStore;
use calbridge_domain::{
    CalbridgeError, PendingSession, Result as DomainResult, SessionKey, SessionState,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::manager::{run_blocking, DatabaseManager};
use crate::errors::InfraError;

/// SQLite implementation of the session store port.
pub struct SqliteSessionStore {
    db: Arc<DatabaseManager>,
}

impl SqliteSessionStore {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    fn load_row(conn: &Connection, storage_key: &str) -> DomainResult<Option<(PendingSession, i64)>> {
        conn.query_row(
            "SELECT payload_json, expires_at FROM pending_sessions WHERE session_key = ?1",
            params![storage_key],
            |row| {
                let payload: String = row.get(0)?;
                let expires_at: i64 = row.get(1)?;
                Ok((payload, expires_at))
            },
        )
        .optional()
        .map_err(InfraError::from)?
        .map(|(payload, expires_at)| {
            let session: PendingSession = serde_json::from_str(&payload)
                .map_err(|e| CalbridgeError::Serialization(e.to_string()))?;
            Ok((session, expires_at))
        })
        .transpose()
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, key: &SessionKey) -> DomainResult<Option<PendingSession>> {
        let storage_key = key.storage_key();
        run_blocking(Arc::clone(&self.db), move |conn| {
            let now = Utc::now().timestamp();
            match Self::load_row(conn, &storage_key)? {
                Some((_, expires_at)) if expires_at <= now => {
                    // Expired records read as absent; drop them lazily.
                    conn.execute(
                        "DELETE FROM pending_sessions WHERE session_key = ?1",
                        params![storage_key],
                    )
                    .map_err(InfraError::from)?;
                    Ok(None)
                }
                Some((session, _)) => Ok(Some(session)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn put(&self, session: &PendingSession) -> DomainResult<()> {
        let storage_key = session.key.storage_key();
        let payload = serde_json::to_string(session)
            .map_err(|e| CalbridgeError::Serialization(e.to_string()))?;
        let state = session.state.as_str().to_string();
        let created_at = session.created_at.timestamp();
        let expires_at = session.expires_at.timestamp();

        run_blocking(Arc::clone(&self.db), move |conn| {
            conn.execute(
                "INSERT INTO pending_sessions (session_key, payload_json, state, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(session_key) DO UPDATE SET
                     payload_json = excluded.payload_json,
                     state = excluded.state,
                     created_at = excluded.created_at,
                     expires_at = excluded.expires_at",
                params![storage_key, payload, state, created_at, expires_at],
            )
            .map_err(InfraError::from)?;
            Ok(())
        })
        .await
    }

    async fn transition(
        &self,
        key: &SessionKey,
        expected: &[SessionState],
        next: SessionState,
    ) -> DomainResult<Option<PendingSession>> {
        let storage_key = key.storage_key();
        let expected: Vec<SessionState> = expected.to_vec();

        run_blocking(Arc::clone(&self.db), move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(InfraError::from)?;

            let now = Utc::now().timestamp();
            let row = tx
                .query_row(
                    "SELECT payload_json, state, expires_at
                     FROM pending_sessions WHERE session_key = ?1",
                    params![storage_key],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                        ))
                    },
                )
                .optional()
                .map_err(InfraError::from)?;

            let Some((payload, state, expires_at)) = row else {
                return Ok(None);
            };
            let current = SessionState::parse(&state)
                .ok_or_else(|| CalbridgeError::Storage(format!("unknown session state: {state}")))?;
            if expires_at <= now || !expected.contains(&current) {
                return Ok(None);
            }

            let mut session: PendingSession = serde_json::from_str(&payload)
                .map_err(|e| CalbridgeError::Serialization(e.to_string()))?;
            session.state = next;
            let updated = serde_json::to_string(&session)
                .map_err(|e| CalbridgeError::Serialization(e.to_string()))?;

            tx.execute(
                "UPDATE pending_sessions SET payload_json = ?2, state = ?3
                 WHERE session_key = ?1",
                params![storage_key, updated, next.as_str()],
            )
            .map_err(InfraError::from)?;
            tx.commit().map_err(InfraError::from)?;

            Ok(Some(session))
        })
        .await
    }

    async fn delete(&self, key: &SessionKey) -> DomainResult<()> {
        let storage_key = key.storage_key();
        run_blocking(Arc::clone(&self.db), move |conn| {
            conn.execute(
                "DELETE FROM pending_sessions WHERE session_key = ?1",
                params![storage_key],
            )
            .map_err(InfraError::from)?;
            Ok(())
        })
        .await
    }
}
