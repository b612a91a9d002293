//! Common error types shared across Calbridge crates.
//!
//! Domain-specific errors live in `calbridge-domain`; this module carries the
//! cross-cutting pieces: a small error enum for infrastructure failures that
//! happen below the domain layer (crypto, serialization), and the
//! [`ErrorClassification`] trait that retry policies and the job executor use
//! to decide whether a failure is worth another attempt.

use std::time::Duration;

use thiserror::Error;

/// Severity level used for monitoring and log routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Expected condition (missing resource, empty result).
    Info,
    /// Degraded but operational (rate limiting, transient failures).
    Warning,
    /// Failure requiring attention.
    Error,
    /// System integrity at risk (data corruption, crypto failures).
    Critical,
}

/// Classification interface implemented by error types that feed retry logic.
pub trait ErrorClassification {
    /// Whether retrying the failed operation can plausibly succeed.
    fn is_retryable(&self) -> bool;

    /// Severity for monitoring and alerting.
    fn severity(&self) -> ErrorSeverity;

    /// Suggested minimum delay before the next attempt, when the source
    /// communicated one (e.g. a Retry-After header).
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Errors produced by the utilities in this crate.
#[derive(Debug, Error)]
pub enum CommonError {
    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CommonError {
    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<serde_json::Error> for CommonError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        // Everything this crate produces is deterministic: a blob that fails
        // authentication will fail again, malformed input stays malformed.
        false
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Crypto(_) => ErrorSeverity::Critical,
            Self::Serialization(_) | Self::InvalidInput(_) => ErrorSeverity::Error,
            Self::Internal(_) => ErrorSeverity::Critical,
        }
    }
}

/// Result alias for this crate.
pub type CommonResult<T> = std::result::Result<T, CommonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_errors_are_never_retryable() {
        assert!(!CommonError::crypto("bad tag").is_retryable());
        assert!(!CommonError::Serialization("eof".into()).is_retryable());
    }

    #[test]
    fn crypto_failures_are_critical() {
        assert_eq!(CommonError::crypto("bad tag").severity(), ErrorSeverity::Critical);
        assert_eq!(
            CommonError::InvalidInput("short key".into()).severity(),
            ErrorSeverity::Error
        );
    }
}
