//! Per-user fixed-window rate limiting for expensive operations.
//!
//! Counter keys embed the window id, so a window rollover naturally starts a
//! fresh counter and the store's TTL reaps stale ones. A store failure fails
//! open: the limiter degrades capability, it never blocks the user flow.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use calbridge_domain::constants::RATE_WINDOW_SECS;
use calbridge_domain::{LimitedOperation, QuotaConfig, RateQuota};

use crate::ports::RateCounterStore;

/// Result of one acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquisition {
    pub allowed: bool,
    pub remaining: u32,
}

/// Fixed-window rate limiter over an external counter store.
pub struct RateLimiter {
    store: Arc<dyn RateCounterStore>,
    quotas: HashMap<LimitedOperation, RateQuota>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateCounterStore>, quotas: HashMap<LimitedOperation, RateQuota>) -> Self {
        Self { store, quotas }
    }

    pub fn from_config(store: Arc<dyn RateCounterStore>, config: &QuotaConfig) -> Self {
        let window = std::time::Duration::from_secs(RATE_WINDOW_SECS as u64);
        let quotas = HashMap::from([
            (
                LimitedOperation::AiParse,
                RateQuota { max_requests: config.ai_parse_per_hour, window },
            ),
            (
                LimitedOperation::Transcribe,
                RateQuota { max_requests: config.transcribe_per_hour, window },
            ),
        ]);
        Self::new(store, quotas)
    }

    /// Try to consume one unit of quota for `(user, operation)`.
    pub async fn try_acquire(&self, user_id: &str, operation: LimitedOperation) -> Acquisition {
        self.try_acquire_at(user_id, operation, Utc::now()).await
    }

    /// Clock-injectable variant for deterministic tests.
    pub async fn try_acquire_at(
        &self,
        user_id: &str,
        operation: LimitedOperation,
        now: DateTime<Utc>,
    ) -> Acquisition {
        let Some(quota) = self.quotas.get(&operation) else {
            return Acquisition { allowed: true, remaining: u32::MAX };
        };

        let window_secs = quota.window.as_secs() as i64;
        let window_id = now.timestamp().div_euclid(window_secs);
        let key = counter_key(user_id, operation, window_id);

        match self.store.incr(&key, window_secs).await {
            Ok(count) => Acquisition {
                allowed: count <= quota.max_requests,
                remaining: quota.max_requests.saturating_sub(count),
            },
            Err(err) => {
                // Fail open: availability over enforcement.
                warn!(%key, error = %err, "rate counter store failed; allowing request");
                Acquisition { allowed: true, remaining: quota.max_requests }
            }
        }
    }
}

fn counter_key(user_id: &str, operation: LimitedOperation, window_id: i64) -> String {
    format!("ratelimit:{}:{}:{}", user_id, operation.as_str(), window_id)
}
