//! SQLite-backed job queue and store.
//!
//! Enqueue and claim are the two atomic points of the executor pipeline:
//! `enqueue` collapses duplicate submissions inside one transaction, and
//! `claim` is a guarded single-statement update so two workers can never
//! run the same record.

use std::sync::Arc;

use async_trait::async_trait;
use calbridge_core::ports::{EnqueueOutcome, JobQueue, JobStore};
use calbridge_domain::{
    CalbridgeError, JobRecord, JobStatus, OperationKind, Result as DomainResult,
};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};

use super::manager::{run_blocking, DatabaseManager};
use crate::errors::InfraError;

/// SQLite implementation of the job queue/store ports.
pub struct SqliteJobStore {
    db: Arc<DatabaseManager>,
}

impl SqliteJobStore {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// Full record lookup, mostly for tests and diagnostics.
    pub async fn get(&self, idempotency_key: &str) -> DomainResult<Option<JobRecord>> {
        let key = idempotency_key.to_string();
        run_blocking(Arc::clone(&self.db), move |conn| {
            conn.query_row(
                "SELECT idempotency_key, operation, payload_json, status, attempt_count,
                        last_error, result_json, next_attempt_at, created_at
                 FROM job_records WHERE idempotency_key = ?1",
                params![key],
                map_job_row,
            )
            .optional()
            .map_err(InfraError::from)?
            .transpose()
        })
        .await
    }
}

fn map_job_row(row: &Row<'_>) -> rusqlite::Result<DomainResult<JobRecord>> {
    let operation: String = row.get(1)?;
    let status: String = row.get(3)?;
    let next_attempt_at: i64 = row.get(7)?;
    let created_at: i64 = row.get(8)?;

    Ok((|| {
        Ok(JobRecord {
            idempotency_key: row_get(row, 0)?,
            operation: OperationKind::parse(&operation)
                .ok_or_else(|| CalbridgeError::Storage(format!("unknown operation: {operation}")))?,
            payload_json: row_get(row, 2)?,
            status: JobStatus::parse(&status)
                .ok_or_else(|| CalbridgeError::Storage(format!("unknown job status: {status}")))?,
            attempt_count: row_get(row, 4)?,
            last_error: row_get(row, 5)?,
            result_json: row_get(row, 6)?,
            next_attempt_at: timestamp(next_attempt_at)?,
            created_at: timestamp(created_at)?,
        })
    })())
}

fn row_get<T: rusqlite::types::FromSql>(row: &Row<'_>, idx: usize) -> DomainResult<T> {
    row.get(idx).map_err(|e| CalbridgeError::Storage(e.to_string()))
}

fn timestamp(secs: i64) -> DomainResult<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| CalbridgeError::Storage(format!("invalid timestamp: {secs}")))
}

#[async_trait]
impl JobQueue for SqliteJobStore {
    async fn enqueue(
        &self,
        operation: OperationKind,
        payload_json: String,
        idempotency_key: String,
    ) -> DomainResult<EnqueueOutcome> {
        run_blocking(Arc::clone(&self.db), move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(InfraError::from)?;

            let existing = tx
                .query_row(
                    "SELECT status, result_json FROM job_records WHERE idempotency_key = ?1",
                    params![idempotency_key],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
                )
                .optional()
                .map_err(InfraError::from)?;

            if let Some((status, result_json)) = existing {
                let outcome = if status == JobStatus::Succeeded.as_str() {
                    EnqueueOutcome::AlreadySucceeded(result_json.unwrap_or_default())
                } else {
                    EnqueueOutcome::Duplicate
                };
                tx.commit().map_err(InfraError::from)?;
                return Ok(outcome);
            }

            let now = Utc::now().timestamp();
            tx.execute(
                "INSERT INTO job_records
                     (idempotency_key, operation, payload_json, status, attempt_count,
                      next_attempt_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
                params![
                    idempotency_key,
                    operation.as_str(),
                    payload_json,
                    JobStatus::Queued.as_str(),
                    now
                ],
            )
            .map_err(InfraError::from)?;
            tx.commit().map_err(InfraError::from)?;

            Ok(EnqueueOutcome::Accepted)
        })
        .await
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn fetch_due(&self, limit: usize) -> DomainResult<Vec<JobRecord>> {
        run_blocking(Arc::clone(&self.db), move |conn| {
            let now = Utc::now().timestamp();
            let mut stmt = conn
                .prepare(
                    "SELECT idempotency_key, operation, payload_json, status, attempt_count,
                            last_error, result_json, next_attempt_at, created_at
                     FROM job_records
                     WHERE status IN (?1, ?2) AND next_attempt_at <= ?3
                     ORDER BY created_at
                     LIMIT ?4",
                )
                .map_err(InfraError::from)?;

            let rows = stmt
                .query_map(
                    params![
                        JobStatus::Queued.as_str(),
                        JobStatus::FailedRetryable.as_str(),
                        now,
                        limit as i64
                    ],
                    map_job_row,
                )
                .map_err(InfraError::from)?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row.map_err(InfraError::from)??);
            }
            Ok(records)
        })
        .await
    }

    async fn claim(&self, idempotency_key: &str) -> DomainResult<bool> {
        let key = idempotency_key.to_string();
        run_blocking(Arc::clone(&self.db), move |conn| {
            let updated = conn
                .execute(
                    "UPDATE job_records
                     SET status = ?2, attempt_count = attempt_count + 1
                     WHERE idempotency_key = ?1 AND status IN (?3, ?4)",
                    params![
                        key,
                        JobStatus::Running.as_str(),
                        JobStatus::Queued.as_str(),
                        JobStatus::FailedRetryable.as_str()
                    ],
                )
                .map_err(InfraError::from)?;
            Ok(updated == 1)
        })
        .await
    }

    async fn mark_succeeded(&self, idempotency_key: &str, result_json: &str) -> DomainResult<()> {
        let key = idempotency_key.to_string();
        let result = result_json.to_string();
        run_blocking(Arc::clone(&self.db), move |conn| {
            conn.execute(
                "UPDATE job_records
                 SET status = ?2, result_json = ?3, last_error = NULL
                 WHERE idempotency_key = ?1",
                params![key, JobStatus::Succeeded.as_str(), result],
            )
            .map_err(InfraError::from)?;
            Ok(())
        })
        .await
    }

    async fn mark_retry(
        &self,
        idempotency_key: &str,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let key = idempotency_key.to_string();
        let error = error.to_string();
        run_blocking(Arc::clone(&self.db), move |conn| {
            conn.execute(
                "UPDATE job_records
                 SET status = ?2, last_error = ?3, next_attempt_at = ?4
                 WHERE idempotency_key = ?1",
                params![
                    key,
                    JobStatus::FailedRetryable.as_str(),
                    error,
                    next_attempt_at.timestamp()
                ],
            )
            .map_err(InfraError::from)?;
            Ok(())
        })
        .await
    }

    async fn mark_terminal(&self, idempotency_key: &str, error: &str) -> DomainResult<()> {
        let key = idempotency_key.to_string();
        let error = error.to_string();
        run_blocking(Arc::clone(&self.db), move |conn| {
            conn.execute(
                "UPDATE job_records
                 SET status = ?2, last_error = ?3
                 WHERE idempotency_key = ?1",
                params![key, JobStatus::FailedTerminal.as_str(), error],
            )
            .map_err(InfraError::from)?;
            Ok(())
        })
        .await
    }

    async fn find_succeeded(&self, idempotency_key: &str) -> DomainResult<Option<String>> {
        let key = idempotency_key.to_string();
        run_blocking(Arc::clone(&self.db), move |conn| {
            conn.query_row(
                "SELECT result_json FROM job_records
                 WHERE idempotency_key = ?1 AND status = ?2",
                params![key, JobStatus::Succeeded.as_str()],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .map_err(InfraError::from)
            .map(|opt| opt.flatten())
            .map_err(Into::into)
        })
        .await
    }
}
