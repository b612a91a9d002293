//! In-memory mock implementations of the core ports.
//!
//! Deterministic doubles for integration tests: no clocks other than the
//! injected ones, no I/O, behaviors configured per test.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use calbridge_core::ports::{
    AiParser, CalendarGateway, EnqueueOutcome, JobQueue, RateCounterStore, SessionStore,
};
use calbridge_domain::{
    BusyInterval, CalbridgeError, CalendarHandle, OperationKind, ParseOutcome, PendingSession,
    Result as DomainResult, SessionKey, SessionState, TimeRange,
};

/// In-memory `SessionStore` honoring expiry and conditional transitions.
#[derive(Default)]
pub struct MockSessionStore {
    sessions: Mutex<HashMap<String, PendingSession>>,
}

#[async_trait]
impl SessionStore for MockSessionStore {
    async fn load(&self, key: &SessionKey) -> DomainResult<Option<PendingSession>> {
        let mut sessions = self.sessions.lock().unwrap();
        let storage_key = key.storage_key();
        if let Some(session) = sessions.get(&storage_key) {
            if session.is_expired(Utc::now()) {
                sessions.remove(&storage_key);
                return Ok(None);
            }
            return Ok(Some(session.clone()));
        }
        Ok(None)
    }

    async fn put(&self, session: &PendingSession) -> DomainResult<()> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.key.storage_key(), session.clone());
        Ok(())
    }

    async fn transition(
        &self,
        key: &SessionKey,
        expected: &[SessionState],
        next: SessionState,
    ) -> DomainResult<Option<PendingSession>> {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get_mut(&key.storage_key()) {
            Some(session)
                if !session.is_expired(Utc::now()) && expected.contains(&session.state) =>
            {
                session.state = next;
                Ok(Some(session.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, key: &SessionKey) -> DomainResult<()> {
        self.sessions.lock().unwrap().remove(&key.storage_key());
        Ok(())
    }
}

/// Gateway double returning configured busy intervals or failures per
/// calendar id.
#[derive(Default)]
pub struct MockCalendarGateway {
    busy: Mutex<HashMap<String, Vec<BusyInterval>>>,
    failing: Mutex<Vec<String>>,
}

impl MockCalendarGateway {
    pub fn with_busy(self, calendar_id: &str, intervals: Vec<BusyInterval>) -> Self {
        self.busy.lock().unwrap().insert(calendar_id.to_string(), intervals);
        self
    }

    pub fn with_failure(self, calendar_id: &str) -> Self {
        self.failing.lock().unwrap().push(calendar_id.to_string());
        self
    }
}

#[async_trait]
impl CalendarGateway for MockCalendarGateway {
    async fn busy_intervals(
        &self,
        _user_id: &str,
        handle: &CalendarHandle,
        _range: &TimeRange,
    ) -> DomainResult<Vec<BusyInterval>> {
        if self.failing.lock().unwrap().contains(&handle.external_id) {
            return Err(CalbridgeError::Storage(format!(
                "calendar {} unreachable",
                handle.external_id
            )));
        }
        Ok(self
            .busy
            .lock()
            .unwrap()
            .get(&handle.external_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// AI collaborator double with scripted responses and a call counter.
pub struct MockAiParser {
    responses: Mutex<Vec<DomainResult<ParseOutcome>>>,
    calls: Mutex<usize>,
}

impl MockAiParser {
    pub fn new(responses: Vec<DomainResult<ParseOutcome>>) -> Self {
        Self { responses: Mutex::new(responses), calls: Mutex::new(0) }
    }

    pub fn never_called() -> Self {
        Self::new(Vec::new())
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl AiParser for MockAiParser {
    async fn parse(
        &self,
        _text: &str,
        _timezone: &str,
        _context: Option<&str>,
    ) -> DomainResult<ParseOutcome> {
        *self.calls.lock().unwrap() += 1;
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(CalbridgeError::Internal("no scripted AI response".into()));
        }
        responses.remove(0)
    }
}

/// Job queue double with duplicate detection and preloaded cached results.
#[derive(Default)]
pub struct MockJobQueue {
    accepted: Mutex<Vec<(OperationKind, String, String)>>,
    succeeded: Mutex<HashMap<String, String>>,
}

impl MockJobQueue {
    pub fn with_succeeded(self, idempotency_key: &str, result_json: &str) -> Self {
        self.succeeded
            .lock()
            .unwrap()
            .insert(idempotency_key.to_string(), result_json.to_string());
        self
    }

    pub fn accepted_jobs(&self) -> Vec<(OperationKind, String, String)> {
        self.accepted.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for MockJobQueue {
    async fn enqueue(
        &self,
        operation: OperationKind,
        payload_json: String,
        idempotency_key: String,
    ) -> DomainResult<EnqueueOutcome> {
        if let Some(result) = self.succeeded.lock().unwrap().get(&idempotency_key) {
            return Ok(EnqueueOutcome::AlreadySucceeded(result.clone()));
        }
        let mut accepted = self.accepted.lock().unwrap();
        if accepted.iter().any(|(_, _, key)| *key == idempotency_key) {
            return Ok(EnqueueOutcome::Duplicate);
        }
        accepted.push((operation, payload_json, idempotency_key));
        Ok(EnqueueOutcome::Accepted)
    }
}

/// Counter store double.
#[derive(Default)]
pub struct MockRateCounterStore {
    counts: Mutex<HashMap<String, u32>>,
}

#[async_trait]
impl RateCounterStore for MockRateCounterStore {
    async fn incr(&self, counter_key: &str, _window_secs: i64) -> DomainResult<u32> {
        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(counter_key.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }
}
