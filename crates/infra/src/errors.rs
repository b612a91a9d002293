//! Error conversions between third-party crates and the domain taxonomy.
//!
//! Infra code maps every I/O failure into `CalbridgeError` at the component
//! boundary; nothing in this crate surfaces an unstructured error. The
//! `InfraError` newtype exists so `From` impls for foreign error types can
//! live here.

use calbridge_domain::{CalbridgeError, ProviderFailure};
use reqwest::StatusCode;

/// Newtype carrying a classified domain error.
#[derive(Debug)]
pub struct InfraError(pub CalbridgeError);

impl From<InfraError> for CalbridgeError {
    fn from(err: InfraError) -> Self {
        err.0
    }
}

impl From<reqwest::Error> for InfraError {
    fn from(err: reqwest::Error) -> Self {
        // Transport-level failures are transient by definition; anything
        // that produced a status code is classified by the caller instead.
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return InfraError(ProviderFailure::Unavailable(err.to_string()).into());
        }
        if err.is_decode() {
            return InfraError(CalbridgeError::Serialization(err.to_string()));
        }
        InfraError(CalbridgeError::Internal(err.to_string()))
    }
}

impl From<rusqlite::Error> for InfraError {
    fn from(err: rusqlite::Error) -> Self {
        InfraError(CalbridgeError::Storage(err.to_string()))
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(err: r2d2::Error) -> Self {
        InfraError(CalbridgeError::Storage(format!("connection pool: {err}")))
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(err: serde_json::Error) -> Self {
        InfraError(CalbridgeError::Serialization(err.to_string()))
    }
}

/// Classify a provider HTTP status into the failure taxonomy.
///
/// 401 means the token died; 429 is throttling (with an optional
/// Retry-After); 5xx is a transient outage; every other error status is a
/// permanent rejection and will not be retried.
pub fn classify_status(
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body: &str,
) -> ProviderFailure {
    match status {
        StatusCode::UNAUTHORIZED => ProviderFailure::AuthExpired,
        StatusCode::TOO_MANY_REQUESTS => ProviderFailure::RateLimited { retry_after_secs },
        status if status.is_server_error() => {
            ProviderFailure::Unavailable(format!("{status}: {}", truncate(body)))
        }
        status => ProviderFailure::PermanentRejection(format!("{status}: {}", truncate(body))),
    }
}

/// Read the Retry-After header (seconds form) from a response.
pub fn retry_after_secs(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

fn truncate(body: &str) -> String {
    const MAX_LEN: usize = 256;
    if body.len() <= MAX_LEN {
        return body.to_string();
    }
    let mut out: String = body.chars().take(MAX_LEN.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
