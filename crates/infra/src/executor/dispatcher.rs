//! Live dispatcher: routes claimed jobs to the connectors.
//!
//! The create-event path holds the two safety properties end to end:
//! a confirm-job whose session moved to a terminal state is rejected before
//! the provider write, and an `AuthExpired` failure gets exactly one
//! refresh-and-retry before being treated as transient.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use calbridge_core::ports::{EventLog, SessionStore, Transcriber};
use calbridge_core::CalendarConnector;
use calbridge_domain::{
    CalbridgeError, ConfirmedEvent, CreateEventPayload, CreateNotePayload, EventStatus,
    JobRecord, OperationKind, ProviderFailure, RefreshTokenPayload, Result, SessionState,
    TranscribePayload,
};
use serde_json::json;
use tracing::{info, warn};

use super::JobDispatcher;
use crate::connectors::ConnectorRegistry;
use crate::vault::CredentialVault;

/// Dispatcher backed by the real connectors, vault, and stores.
pub struct LiveDispatcher {
    vault: Arc<CredentialVault>,
    registry: Arc<ConnectorRegistry>,
    sessions: Arc<dyn SessionStore>,
    events: Arc<dyn EventLog>,
    transcriber: Arc<dyn Transcriber>,
}

impl LiveDispatcher {
    pub fn new(
        vault: Arc<CredentialVault>,
        registry: Arc<ConnectorRegistry>,
        sessions: Arc<dyn SessionStore>,
        events: Arc<dyn EventLog>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        Self { vault, registry, sessions, events, transcriber }
    }

    fn parse_payload<T: serde::de::DeserializeOwned>(job: &JobRecord) -> Result<T> {
        serde_json::from_str(&job.payload_json).map_err(|e| {
            // A payload that does not deserialize can never succeed.
            CalbridgeError::from(ProviderFailure::PermanentRejection(format!(
                "malformed job payload: {e}"
            )))
        })
    }

    async fn handle_create_event(&self, job: &JobRecord) -> Result<serde_json::Value> {
        let payload: CreateEventPayload = Self::parse_payload(job)?;

        // Terminal-state check: a cancel or expiry that raced the confirm
        // wins, and the provider write never happens.
        if let Some(session) = self.sessions.load(&payload.session_key).await? {
            if matches!(session.state, SessionState::Cancelled | SessionState::Expired) {
                warn!(key = %payload.session_key.storage_key(), "session terminal; rejecting write");
                return Err(CalbridgeError::SessionExpired);
            }
        }

        let connector = self.registry.calendar(payload.provider).ok_or_else(|| {
            CalbridgeError::Config(format!("no calendar connector for {}", payload.provider))
        })?;

        let result = self
            .create_with_refresh(&payload, connector.as_ref(), &job.idempotency_key)
            .await;

        match &result {
            Ok(event) => {
                self.events.record(&payload.user_id, event).await?;
                info!(
                    user = %payload.user_id,
                    event = %event.external_event_id,
                    "event created"
                );
            }
            Err(err) if !err.is_retryable() => {
                // Permanent failures are logged so the user-facing layer can
                // report the delivery failure.
                let failed = ConfirmedEvent {
                    external_event_id: String::new(),
                    calendar_id: payload.calendar_id.clone(),
                    provider: payload.provider,
                    title: payload.draft.title.clone(),
                    start: payload.draft.start,
                    end: payload.draft.end_or_default(),
                    html_link: None,
                    status: EventStatus::Failed,
                };
                self.events.record(&payload.user_id, &failed).await?;
            }
            Err(_) => {}
        }

        let event = result?;
        Ok(json!({
            "external_event_id": event.external_event_id,
            "calendar_id": event.calendar_id,
            "html_link": event.html_link,
        }))
    }

    async fn create_with_refresh(
        &self,
        payload: &CreateEventPayload,
        connector: &dyn CalendarConnector,
        client_event_id: &str,
    ) -> Result<ConfirmedEvent> {
        let access = self.vault.access(&payload.user_id, payload.provider).await?;
        let first = connector
            .create_event(
                &access,
                &payload.calendar_id,
                &payload.draft,
                client_event_id,
                payload.conference,
            )
            .await;

        match first {
            Err(CalbridgeError::Provider(ProviderFailure::AuthExpired))
                if connector.supports_refresh() =>
            {
                info!(user = %payload.user_id, provider = %payload.provider, "token expired; refreshing once");
                let base = self.registry.base(payload.provider).ok_or_else(|| {
                    CalbridgeError::Config(format!("no connector for {}", payload.provider))
                })?;
                self.vault.refresh(&payload.user_id, base.as_ref()).await?;

                let access = self.vault.access(&payload.user_id, payload.provider).await?;
                connector
                    .create_event(
                        &access,
                        &payload.calendar_id,
                        &payload.draft,
                        client_event_id,
                        payload.conference,
                    )
                    .await
            }
            other => other,
        }
    }

    async fn handle_create_note(&self, job: &JobRecord) -> Result<serde_json::Value> {
        let payload: CreateNotePayload = Self::parse_payload(job)?;

        if let Some(session) = self.sessions.load(&payload.session_key).await? {
            if matches!(session.state, SessionState::Cancelled | SessionState::Expired) {
                return Err(CalbridgeError::SessionExpired);
            }
        }

        let connector = self.registry.notes(payload.provider).ok_or_else(|| {
            CalbridgeError::Config(format!("no notes connector for {}", payload.provider))
        })?;

        let access = self.vault.access(&payload.user_id, payload.provider).await?;
        let note = connector
            .create_note(&access, payload.database_id.as_deref(), &payload.note)
            .await?;

        info!(user = %payload.user_id, note = %note.external_id, "note created");
        Ok(json!({"external_id": note.external_id, "url": note.url}))
    }

    async fn handle_refresh_token(&self, job: &JobRecord) -> Result<serde_json::Value> {
        let payload: RefreshTokenPayload = Self::parse_payload(job)?;

        let connector = self.registry.base(payload.provider).ok_or_else(|| {
            CalbridgeError::Config(format!("no connector for {}", payload.provider))
        })?;

        let credential = self.vault.refresh(&payload.user_id, connector.as_ref()).await?;
        Ok(json!({
            "refreshed": true,
            "expires_at": credential.expires_at.map(|t| t.to_rfc3339()),
        }))
    }

    async fn handle_transcribe(&self, job: &JobRecord) -> Result<serde_json::Value> {
        let payload: TranscribePayload = Self::parse_payload(job)?;

        let audio = BASE64.decode(&payload.audio_base64).map_err(|e| {
            CalbridgeError::from(ProviderFailure::PermanentRejection(format!(
                "audio payload not base64: {e}"
            )))
        })?;

        let text = self.transcriber.transcribe(&audio, &payload.filename).await?;
        Ok(json!({"text": text}))
    }
}

#[async_trait]
impl JobDispatcher for LiveDispatcher {
    async fn dispatch(&self, job: &JobRecord) -> Result<serde_json::Value> {
        match job.operation {
            OperationKind::CreateEvent => self.handle_create_event(job).await,
            OperationKind::CreateNote => self.handle_create_note(job).await,
            OperationKind::RefreshToken => self.handle_refresh_token(job).await,
            OperationKind::Transcribe => self.handle_transcribe(job).await,
        }
    }
}
