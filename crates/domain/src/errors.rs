//! Error types used throughout the application.
//!
//! Connector- and parse-level failures are classified at the component
//! boundary into this taxonomy; the job executor's retry policy and the
//! user-facing layer both key off it. Only `Provider(PermanentRejection)`
//! and `SessionExpired` are meant to surface to end users.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Typed failure reported by a provider connector.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum ProviderFailure {
    /// Access token rejected; one refresh-and-retry is attempted before this
    /// is treated as transient.
    #[error("provider auth expired")]
    AuthExpired,

    /// Provider throttled the call; retried with backoff.
    #[error("provider rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Transient network or server failure; retried with backoff.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Malformed payload or denied permission; never retried.
    #[error("provider rejected request: {0}")]
    PermanentRejection(String),
}

/// Main error type for Calbridge.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum CalbridgeError {
    #[error(transparent)]
    Provider(#[from] ProviderFailure),

    /// An expensive-operation quota was exhausted. Triggers local-parse
    /// fallback; not shown to the user as an error.
    #[error("quota exceeded for {0}")]
    QuotaExceeded(String),

    /// Confirm/edit attempted on a vanished or expired session.
    #[error("session expired or not found")]
    SessionExpired,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CalbridgeError {
    /// Whether the job executor should retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(failure) => !matches!(failure, ProviderFailure::PermanentRejection(_)),
            Self::Storage(_) => true,
            _ => false,
        }
    }

    /// Minimum delay before the next attempt, when the provider sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Provider(ProviderFailure::RateLimited { retry_after_secs: Some(secs) }) => {
                Some(Duration::from_secs(*secs))
            }
            _ => None,
        }
    }

    /// Whether this failure should be surfaced to the end-user-facing layer.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::Provider(ProviderFailure::PermanentRejection(_)) | Self::SessionExpired
        )
    }
}

/// Result type alias for Calbridge operations.
pub type Result<T> = std::result::Result<T, CalbridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_provider_failures_are_retryable() {
        assert!(CalbridgeError::from(ProviderFailure::AuthExpired).is_retryable());
        assert!(CalbridgeError::from(ProviderFailure::Unavailable("503".into())).is_retryable());
        assert!(CalbridgeError::from(ProviderFailure::RateLimited { retry_after_secs: None })
            .is_retryable());
    }

    #[test]
    fn permanent_rejection_is_terminal_and_visible() {
        let err = CalbridgeError::from(ProviderFailure::PermanentRejection("bad payload".into()));
        assert!(!err.is_retryable());
        assert!(err.is_user_visible());
    }

    #[test]
    fn quota_exhaustion_is_not_user_visible() {
        let err = CalbridgeError::QuotaExceeded("ai_parse".into());
        assert!(!err.is_retryable());
        assert!(!err.is_user_visible());
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let err = CalbridgeError::from(ProviderFailure::RateLimited { retry_after_secs: Some(30) });
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
    }
}
