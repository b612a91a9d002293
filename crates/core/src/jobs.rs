//! Idempotent job submission helpers.
//!
//! The idempotency key is derived deterministically from the triggering
//! event (user, operation, payload), so a retried enqueue (a double-tapped
//! confirm, a redelivered message) collapses to one execution.

use serde::Serialize;
use sha2::{Digest, Sha256};

use calbridge_domain::{CalbridgeError, OperationKind, Result};

use crate::ports::{EnqueueOutcome, JobQueue};

/// Deterministic idempotency key for `(user, operation, payload)`.
pub fn idempotency_key(user_id: &str, operation: OperationKind, payload_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b"|");
    hasher.update(operation.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(payload_json.as_bytes());
    let digest = hasher.finalize();
    format!("{}:{}", operation.as_str(), hex::encode(&digest[..16]))
}

/// Serialize the payload, derive the key, and enqueue.
///
/// Returns the key together with the enqueue outcome so callers can report
/// an already-cached result without waiting for the executor.
pub async fn submit<P: Serialize>(
    queue: &dyn JobQueue,
    user_id: &str,
    operation: OperationKind,
    payload: &P,
) -> Result<(String, EnqueueOutcome)> {
    let payload_json = serde_json::to_string(payload)
        .map_err(|e| CalbridgeError::Serialization(e.to_string()))?;
    let key = idempotency_key(user_id, operation, &payload_json);
    let outcome = queue.enqueue(operation, payload_json, key.clone()).await?;
    Ok((key, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_deterministic() {
        let a = idempotency_key("u1", OperationKind::CreateEvent, r#"{"title":"standup"}"#);
        let b = idempotency_key("u1", OperationKind::CreateEvent, r#"{"title":"standup"}"#);
        assert_eq!(a, b);
    }

    #[test]
    fn key_varies_by_user_operation_and_payload() {
        let base = idempotency_key("u1", OperationKind::CreateEvent, "{}");
        assert_ne!(base, idempotency_key("u2", OperationKind::CreateEvent, "{}"));
        assert_ne!(base, idempotency_key("u1", OperationKind::CreateNote, "{}"));
        assert_ne!(base, idempotency_key("u1", OperationKind::CreateEvent, r#"{"a":1}"#));
    }

    #[test]
    fn key_is_prefixed_by_operation() {
        let key = idempotency_key("u1", OperationKind::RefreshToken, "{}");
        assert!(key.starts_with("refresh_token:"));
    }
}
