//! Background job model: operations, statuses, records, payloads.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::calendar::ProviderKind;
use super::drafts::{ConferenceKind, EventDraft, NoteDraft};
use super::session::SessionKey;

/// Kinds of provider-mutating (or otherwise slow) operations the job
/// executor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateEvent,
    CreateNote,
    RefreshToken,
    Transcribe,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateEvent => "create_event",
            Self::CreateNote => "create_note",
            Self::RefreshToken => "refresh_token",
            Self::Transcribe => "transcribe",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create_event" => Some(Self::CreateEvent),
            "create_note" => Some(Self::CreateNote),
            "refresh_token" => Some(Self::RefreshToken),
            "transcribe" => Some(Self::Transcribe),
            _ => None,
        }
    }
}

/// Expensive operations guarded by per-user quotas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitedOperation {
    AiParse,
    Transcribe,
}

impl LimitedOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AiParse => "ai_parse",
            Self::Transcribe => "transcribe",
        }
    }
}

/// Quota configuration for one limited operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateQuota {
    pub max_requests: u32,
    #[serde(with = "duration_secs")]
    pub window: Duration,
}

mod duration_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    FailedRetryable,
    FailedTerminal,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::FailedTerminal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::FailedRetryable => "failed_retryable",
            Self::FailedTerminal => "failed_terminal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed_retryable" => Some(Self::FailedRetryable),
            "failed_terminal" => Some(Self::FailedTerminal),
            _ => None,
        }
    }
}

/// Durable record of one enqueued operation, keyed by idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub idempotency_key: String,
    pub operation: OperationKind,
    pub payload_json: String,
    pub status: JobStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    /// Cached result returned for duplicate submissions once succeeded.
    pub result_json: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Payload for `OperationKind::CreateEvent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventPayload {
    pub user_id: String,
    /// Session the confirm action came from; the executor re-verifies the
    /// session reached a confirmed state before writing.
    pub session_key: SessionKey,
    pub provider: ProviderKind,
    pub calendar_id: String,
    pub draft: EventDraft,
    pub conference: Option<ConferenceKind>,
}

/// Payload for `OperationKind::CreateNote`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotePayload {
    pub user_id: String,
    pub session_key: SessionKey,
    pub provider: ProviderKind,
    pub database_id: Option<String>,
    pub note: NoteDraft,
}

/// Payload for `OperationKind::RefreshToken`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenPayload {
    pub user_id: String,
    pub provider: ProviderKind,
}

/// Payload for `OperationKind::Transcribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribePayload {
    pub user_id: String,
    pub audio_base64: String,
    pub filename: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::FailedRetryable,
            JobStatus::FailedTerminal,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::FailedTerminal.is_terminal());
        assert!(!JobStatus::FailedRetryable.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }

    #[test]
    fn operation_round_trips() {
        for op in [
            OperationKind::CreateEvent,
            OperationKind::CreateNote,
            OperationKind::RefreshToken,
            OperationKind::Transcribe,
        ] {
            assert_eq!(OperationKind::parse(op.as_str()), Some(op));
        }
    }
}
