//! Infrastructure port interfaces.
//!
//! Sessions, rate counters, and job records live exclusively behind these
//! traits in a shared external store; the services in this crate hold no
//! cross-call state, so multiple stateless instances can run concurrently.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use calbridge_domain::{
    BusyInterval, CalendarHandle, ConfirmedEvent, JobRecord, OperationKind, ParseOutcome,
    PendingSession, ProviderCredential, ProviderKind, Result, SessionKey, SessionState, TimeRange,
};

/// Outcome of an idempotent job submission.
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// A new job record was created.
    Accepted,
    /// A record with this key is already queued or running; nothing added.
    Duplicate,
    /// The operation already succeeded; the cached result is returned
    /// without re-invoking the side effect.
    AlreadySucceeded(String),
}

/// Pending-session persistence with per-record expiry.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the live session for the key; expired records are treated as
    /// absent (and may be dropped by the implementation).
    async fn load(&self, key: &SessionKey) -> Result<Option<PendingSession>>;

    /// Store the session, replacing any existing record for the key.
    async fn put(&self, session: &PendingSession) -> Result<()>;

    /// Atomic conditional transition: move the session to `next` only if its
    /// current state is one of `expected` and it has not expired. Returns
    /// the updated session, or `None` when the condition failed (missing,
    /// expired, or already in another state).
    async fn transition(
        &self,
        key: &SessionKey,
        expected: &[SessionState],
        next: SessionState,
    ) -> Result<Option<PendingSession>>;

    async fn delete(&self, key: &SessionKey) -> Result<()>;
}

/// Windowed counter store for rate limiting.
#[async_trait]
pub trait RateCounterStore: Send + Sync {
    /// Increment the counter for `counter_key` and return the
    /// post-increment count. `window_secs` bounds the record's lifetime.
    async fn incr(&self, counter_key: &str, window_secs: i64) -> Result<u32>;
}

/// Durable job submission, de-duplicated by idempotency key.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(
        &self,
        operation: OperationKind,
        payload_json: String,
        idempotency_key: String,
    ) -> Result<EnqueueOutcome>;
}

/// Durable job store driving the executor. `claim` must be atomic: of two
/// concurrent workers claiming the same record, exactly one wins.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Queued or retryable jobs whose `next_attempt_at` has passed.
    async fn fetch_due(&self, limit: usize) -> Result<Vec<JobRecord>>;

    /// Atomically move the record to `running` and bump its attempt count.
    /// Returns `false` when another worker got there first (or the record
    /// already reached a terminal state).
    async fn claim(&self, idempotency_key: &str) -> Result<bool>;

    async fn mark_succeeded(&self, idempotency_key: &str, result_json: &str) -> Result<()>;

    async fn mark_retry(
        &self,
        idempotency_key: &str,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn mark_terminal(&self, idempotency_key: &str, error: &str) -> Result<()>;

    /// Cached result for an already-succeeded key, if any.
    async fn find_succeeded(&self, idempotency_key: &str) -> Result<Option<String>>;
}

/// Encrypted credential and calendar-handle persistence.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn upsert_credential(&self, credential: &ProviderCredential) -> Result<()>;

    async fn get_credential(
        &self,
        user_id: &str,
        provider: ProviderKind,
    ) -> Result<Option<ProviderCredential>>;

    async fn delete_credential(&self, user_id: &str, provider: ProviderKind) -> Result<()>;

    /// Refreshable credentials expiring before the horizon (for the
    /// periodic refresh sweep).
    async fn list_expiring(&self, before: DateTime<Utc>) -> Result<Vec<ProviderCredential>>;

    async fn upsert_handle(&self, user_id: &str, handle: &CalendarHandle) -> Result<()>;

    async fn list_handles(&self, user_id: &str) -> Result<Vec<CalendarHandle>>;

    /// Mark one handle primary, clearing the flag on every other handle of
    /// the user (at most one primary per user).
    async fn set_primary(
        &self,
        user_id: &str,
        provider: ProviderKind,
        external_id: &str,
    ) -> Result<()>;
}

/// Append-only log of provider write outcomes.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn record(&self, user_id: &str, event: &ConfirmedEvent) -> Result<()>;

    async fn list_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<ConfirmedEvent>>;
}

/// Resolves a calendar handle to its busy intervals; implemented in infra
/// over the connector registry and credential vault.
#[async_trait]
pub trait CalendarGateway: Send + Sync {
    async fn busy_intervals(
        &self,
        user_id: &str,
        handle: &CalendarHandle,
        range: &TimeRange,
    ) -> Result<Vec<BusyInterval>>;
}

/// External NLU collaborator. Network call; may fail or time out.
#[async_trait]
pub trait AiParser: Send + Sync {
    async fn parse(
        &self,
        text: &str,
        timezone: &str,
        context: Option<&str>,
    ) -> Result<ParseOutcome>;
}

/// External speech-to-text collaborator.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8], filename: &str) -> Result<String>;
}
