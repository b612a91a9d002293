//! Pending-session types for the confirmation dialogue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::calendar::BusyInterval;
use super::drafts::{EventDraft, NoteDraft};

/// Session identity: one active session per (user, conversation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub user_id: String,
    pub conversation_id: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), conversation_id: conversation_id.into() }
    }

    /// Store key under which the session record lives.
    pub fn storage_key(&self) -> String {
        format!("pending:{}:{}", self.user_id, self.conversation_id)
    }
}

/// The draft held by a pending session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionDraft {
    Event(EventDraft),
    Note(NoteDraft),
}

/// Confirmation dialogue states.
///
/// `Confirmed`, `Cancelled` and `Expired` are terminal; a session in a
/// terminal state can never be confirmed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitingConfirmation,
    Editing,
    CalendarReselection,
    Confirmed,
    Cancelled,
    Expired,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Cancelled | Self::Expired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Editing => "editing",
            Self::CalendarReselection => "calendar_reselection",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "awaiting_confirmation" => Some(Self::AwaitingConfirmation),
            "editing" => Some(Self::Editing),
            "calendar_reselection" => Some(Self::CalendarReselection),
            "confirmed" => Some(Self::Confirmed),
            "cancelled" => Some(Self::Cancelled),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// The transient record of a draft awaiting user confirmation, edit, or
/// cancellation. Stored externally with a TTL; the service holds no session
/// memory between calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSession {
    pub key: SessionKey,
    pub draft: SessionDraft,
    /// Conflicts found at draft time, kept so the confirmation message can
    /// show them without re-aggregating.
    pub conflicts: Vec<BusyInterval>,
    /// Target calendar chosen during reselection (primary when `None`).
    pub target_calendar: Option<String>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
