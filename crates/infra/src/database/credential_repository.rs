//! SQLite-backed credential and calendar-handle store.

use std::sync::Arc;

use async_trait::async_trait;
use calbridge_core::ports::CredentialStore;
use calbridge_domain::{
    CalbridgeError, CalendarHandle, ProviderCredential, ProviderKind, Result as DomainResult,
};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};

use super::manager::{run_blocking, DatabaseManager};
use crate::errors::InfraError;

/// SQLite implementation of the credential store port.
pub struct SqliteCredentialStore {
    db: Arc<DatabaseManager>,
}

impl SqliteCredentialStore {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }
}

fn map_credential(row: &Row<'_>) -> rusqlite::Result<DomainResult<ProviderCredential>> {
    let provider: String = row.get(1)?;
    let expires_at: Option<i64> = row.get(3)?;
    let refreshable: i64 = row.get(4)?;

    Ok((|| {
        Ok(ProviderCredential {
            user_id: row.get(0).map_err(storage_err)?,
            provider: ProviderKind::parse(&provider)
                .ok_or_else(|| CalbridgeError::Storage(format!("unknown provider: {provider}")))?,
            blob: row.get(2).map_err(storage_err)?,
            expires_at: expires_at.map(timestamp).transpose()?,
            refreshable: refreshable != 0,
        })
    })())
}

fn map_handle(row: &Row<'_>) -> rusqlite::Result<DomainResult<CalendarHandle>> {
    let provider: String = row.get(0)?;

    Ok((|| {
        Ok(CalendarHandle {
            provider: ProviderKind::parse(&provider)
                .ok_or_else(|| CalbridgeError::Storage(format!("unknown provider: {provider}")))?,
            external_id: row.get(1).map_err(storage_err)?,
            display_name: row.get(2).map_err(storage_err)?,
            is_primary: row.get::<_, i64>(3).map_err(storage_err)? != 0,
            is_enabled: row.get::<_, i64>(4).map_err(storage_err)? != 0,
        })
    })())
}

fn storage_err(err: rusqlite::Error) -> CalbridgeError {
    CalbridgeError::Storage(err.to_string())
}

fn timestamp(secs: i64) -> DomainResult<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| CalbridgeError::Storage(format!("invalid timestamp: {secs}")))
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn upsert_credential(&self, credential: &ProviderCredential) -> DomainResult<()> {
        let credential = credential.clone();
        run_blocking(Arc::clone(&self.db), move |conn| {
            conn.execute(
                "INSERT INTO provider_credentials (user_id, provider, blob, expires_at, refreshable)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id, provider) DO UPDATE SET
                     blob = excluded.blob,
                     expires_at = excluded.expires_at,
                     refreshable = excluded.refreshable",
                params![
                    credential.user_id,
                    credential.provider.as_str(),
                    credential.blob,
                    credential.expires_at.map(|t| t.timestamp()),
                    credential.refreshable as i64
                ],
            )
            .map_err(InfraError::from)?;
            Ok(())
        })
        .await
    }

    async fn get_credential(
        &self,
        user_id: &str,
        provider: ProviderKind,
    ) -> DomainResult<Option<ProviderCredential>> {
        let user_id = user_id.to_string();
        run_blocking(Arc::clone(&self.db), move |conn| {
            conn.query_row(
                "SELECT user_id, provider, blob, expires_at, refreshable
                 FROM provider_credentials WHERE user_id = ?1 AND provider = ?2",
                params![user_id, provider.as_str()],
                map_credential,
            )
            .optional()
            .map_err(InfraError::from)?
            .transpose()
        })
        .await
    }

    async fn delete_credential(&self, user_id: &str, provider: ProviderKind) -> DomainResult<()> {
        let user_id = user_id.to_string();
        run_blocking(Arc::clone(&self.db), move |conn| {
            conn.execute(
                "DELETE FROM provider_credentials WHERE user_id = ?1 AND provider = ?2",
                params![user_id, provider.as_str()],
            )
            .map_err(InfraError::from)?;
            Ok(())
        })
        .await
    }

    async fn list_expiring(
        &self,
        before: DateTime<Utc>,
    ) -> DomainResult<Vec<ProviderCredential>> {
        run_blocking(Arc::clone(&self.db), move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT user_id, provider, blob, expires_at, refreshable
                     FROM provider_credentials
                     WHERE refreshable = 1 AND expires_at IS NOT NULL AND expires_at <= ?1",
                )
                .map_err(InfraError::from)?;

            let rows = stmt
                .query_map(params![before.timestamp()], map_credential)
                .map_err(InfraError::from)?;

            let mut credentials = Vec::new();
            for row in rows {
                credentials.push(row.map_err(InfraError::from)??);
            }
            Ok(credentials)
        })
        .await
    }

    async fn upsert_handle(&self, user_id: &str, handle: &CalendarHandle) -> DomainResult<()> {
        let user_id = user_id.to_string();
        let handle = handle.clone();
        run_blocking(Arc::clone(&self.db), move |conn| {
            conn.execute(
                "INSERT INTO calendar_handles
                     (user_id, provider, external_id, display_name, is_primary, is_enabled)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(user_id, provider, external_id) DO UPDATE SET
                     display_name = excluded.display_name,
                     is_primary = excluded.is_primary,
                     is_enabled = excluded.is_enabled",
                params![
                    user_id,
                    handle.provider.as_str(),
                    handle.external_id,
                    handle.display_name,
                    handle.is_primary as i64,
                    handle.is_enabled as i64
                ],
            )
            .map_err(InfraError::from)?;
            Ok(())
        })
        .await
    }

    async fn list_handles(&self, user_id: &str) -> DomainResult<Vec<CalendarHandle>> {
        let user_id = user_id.to_string();
        run_blocking(Arc::clone(&self.db), move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT provider, external_id, display_name, is_primary, is_enabled
                     FROM calendar_handles WHERE user_id = ?1
                     ORDER BY is_primary DESC, display_name",
                )
                .map_err(InfraError::from)?;

            let rows = stmt.query_map(params![user_id], map_handle).map_err(InfraError::from)?;

            let mut handles = Vec::new();
            for row in rows {
                handles.push(row.map_err(InfraError::from)??);
            }
            Ok(handles)
        })
        .await
    }

    async fn set_primary(
        &self,
        user_id: &str,
        provider: ProviderKind,
        external_id: &str,
    ) -> DomainResult<()> {
        let user_id = user_id.to_string();
        let external_id = external_id.to_string();
        run_blocking(Arc::clone(&self.db), move |conn| {
            // Clearing and setting must be one transaction to hold the
            // at-most-one-primary invariant.
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(InfraError::from)?;

            tx.execute(
                "UPDATE calendar_handles SET is_primary = 0 WHERE user_id = ?1",
                params![user_id],
            )
            .map_err(InfraError::from)?;

            let updated = tx
                .execute(
                    "UPDATE calendar_handles SET is_primary = 1
                     WHERE user_id = ?1 AND provider = ?2 AND external_id = ?3",
                    params![user_id, provider.as_str(), external_id],
                )
                .map_err(InfraError::from)?;

            if updated == 0 {
                return Err(CalbridgeError::NotFound(format!(
                    "calendar handle {external_id} for {provider}"
                )));
            }

            tx.commit().map_err(InfraError::from)?;
            Ok(())
        })
        .await
    }
}
