//! Pending-session state machine.
//!
//! Every transition loads, mutates, and stores the session record within one
//! operation against the external store; the service keeps no in-process
//! session memory, so any number of stateless instances can serve the same
//! user. Terminal-state safety (a cancelled or expired session can never be
//! confirmed) rests on the store's atomic conditional transition.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use calbridge_domain::{
    BusyInterval, CalbridgeError, PendingSession, Result, SessionDraft, SessionKey, SessionState,
};

use crate::ports::SessionStore;

/// States a confirm may move from.
const CONFIRMABLE: [SessionState; 3] = [
    SessionState::AwaitingConfirmation,
    SessionState::Editing,
    SessionState::CalendarReselection,
];

/// Service driving the confirmation dialogue.
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>, ttl_minutes: i64) -> Self {
        Self { store, ttl: Duration::minutes(ttl_minutes) }
    }

    /// Open a session for a freshly produced, conflict-checked draft.
    ///
    /// Supersedes any existing session for the key (last-write-wins): a new
    /// draft invalidates the previous one rather than stacking.
    pub async fn open(
        &self,
        key: SessionKey,
        draft: SessionDraft,
        conflicts: Vec<BusyInterval>,
    ) -> Result<PendingSession> {
        self.open_at(key, draft, conflicts, Utc::now()).await
    }

    pub async fn open_at(
        &self,
        key: SessionKey,
        draft: SessionDraft,
        conflicts: Vec<BusyInterval>,
        now: DateTime<Utc>,
    ) -> Result<PendingSession> {
        let session = PendingSession {
            key,
            draft,
            conflicts,
            target_calendar: None,
            state: SessionState::AwaitingConfirmation,
            created_at: now,
            expires_at: now + self.ttl,
        };
        self.store.put(&session).await?;
        info!(key = %session.key.storage_key(), "pending session opened");
        Ok(session)
    }

    /// Confirm the draft. Atomic: succeeds only while the session is live
    /// and in a confirmable state; the caller enqueues the provider write
    /// with the returned session.
    pub async fn confirm(&self, key: &SessionKey) -> Result<PendingSession> {
        match self.store.transition(key, &CONFIRMABLE, SessionState::Confirmed).await? {
            Some(session) => {
                info!(key = %key.storage_key(), "session confirmed");
                Ok(session)
            }
            None => Err(CalbridgeError::SessionExpired),
        }
    }

    /// Mutate the draft in place; the session stays awaiting confirmation
    /// and its TTL is not extended.
    pub async fn edit<F>(&self, key: &SessionKey, mutate: F) -> Result<PendingSession>
    where
        F: FnOnce(&mut SessionDraft),
    {
        let mut session = self.load_live(key).await?;
        mutate(&mut session.draft);
        session.state = SessionState::AwaitingConfirmation;
        self.store.put(&session).await?;
        debug!(key = %key.storage_key(), "session draft edited");
        Ok(session)
    }

    /// Pick a different target calendar, then return to awaiting
    /// confirmation.
    pub async fn reselect_calendar(
        &self,
        key: &SessionKey,
        calendar_id: impl Into<String>,
    ) -> Result<PendingSession> {
        let mut session = self.load_live(key).await?;
        session.target_calendar = Some(calendar_id.into());
        session.state = SessionState::AwaitingConfirmation;
        self.store.put(&session).await?;
        Ok(session)
    }

    /// Cancel the session. Terminal; no side effects. Cancelling an already
    /// vanished session is a no-op.
    pub async fn cancel(&self, key: &SessionKey) -> Result<()> {
        let cancelled =
            self.store.transition(key, &CONFIRMABLE, SessionState::Cancelled).await?;
        if cancelled.is_some() {
            info!(key = %key.storage_key(), "session cancelled");
        }
        Ok(())
    }

    /// Current live session for the key, if any.
    pub async fn peek(&self, key: &SessionKey) -> Result<Option<PendingSession>> {
        self.store.load(key).await
    }

    async fn load_live(&self, key: &SessionKey) -> Result<PendingSession> {
        match self.store.load(key).await? {
            Some(session) if !session.state.is_terminal() => Ok(session),
            _ => Err(CalbridgeError::SessionExpired),
        }
    }
}
