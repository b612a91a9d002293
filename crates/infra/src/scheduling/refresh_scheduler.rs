//! Periodic token-refresh sweep.
//!
//! A cron job walks the credentials expiring within the horizon and
//! enqueues one `RefreshToken` job per (user, provider). The idempotency
//! key is derived from the credential's expiry bucket, so overlapping
//! sweeps collapse into a single refresh. The actual provider call happens
//! inside the job executor like every other mutation.

use std::sync::Arc;
use std::time::Duration;

use calbridge_core::idempotency_key;
use calbridge_core::ports::{CredentialStore, JobQueue};
use calbridge_domain::{OperationKind, RefreshTokenPayload};
use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, instrument, warn};

use super::error::{SchedulerError, SchedulerResult};

/// Configuration for the token-refresh scheduler.
#[derive(Debug, Clone)]
pub struct TokenRefreshSchedulerConfig {
    /// Cron expression describing the sweep schedule.
    pub cron_expression: String,
    /// Credentials expiring within this horizon are refreshed.
    pub horizon: chrono::Duration,
    /// Timeout for starting the underlying scheduler.
    pub start_timeout: Duration,
    /// Timeout for stopping the scheduler.
    pub stop_timeout: Duration,
}

impl Default for TokenRefreshSchedulerConfig {
    fn default() -> Self {
        Self {
            cron_expression: "0 */30 * * * *".into(), // every 30 minutes
            horizon: chrono::Duration::hours(1),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

/// Token-refresh sweep with explicit lifecycle management.
pub struct TokenRefreshScheduler {
    scheduler: Option<JobScheduler>,
    config: TokenRefreshSchedulerConfig,
    credentials: Arc<dyn CredentialStore>,
    queue: Arc<dyn JobQueue>,
}

impl TokenRefreshScheduler {
    pub fn new(
        config: TokenRefreshSchedulerConfig,
        credentials: Arc<dyn CredentialStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self { scheduler: None, config, credentials, queue }
    }

    /// Start the scheduler.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let scheduler = self.build_scheduler().await?;

        tokio::time::timeout(self.config.start_timeout, scheduler.start())
            .await
            .map_err(|_| SchedulerError::Timeout {
                seconds: self.config.start_timeout.as_secs(),
            })?
            .map_err(|e| SchedulerError::StartFailed(e.to_string()))?;

        self.scheduler = Some(scheduler);
        info!(cron = %self.config.cron_expression, "token refresh scheduler started");
        Ok(())
    }

    /// Stop the scheduler.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        let mut scheduler = self.scheduler.take().ok_or(SchedulerError::NotRunning)?;

        tokio::time::timeout(self.config.stop_timeout, scheduler.shutdown())
            .await
            .map_err(|_| SchedulerError::Timeout { seconds: self.config.stop_timeout.as_secs() })?
            .map_err(|e| SchedulerError::StopFailed(e.to_string()))?;

        info!("token refresh scheduler stopped");
        Ok(())
    }

    /// Returns true when a scheduler instance is active.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    async fn build_scheduler(&self) -> SchedulerResult<JobScheduler> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| SchedulerError::CreationFailed(e.to_string()))?;

        let credentials = Arc::clone(&self.credentials);
        let queue = Arc::clone(&self.queue);
        let horizon = self.config.horizon;

        let job = Job::new_async(self.config.cron_expression.as_str(), move |_id, _lock| {
            let credentials = Arc::clone(&credentials);
            let queue = Arc::clone(&queue);

            Box::pin(async move {
                if let Err(err) = Self::sweep(credentials, queue, horizon).await {
                    error!(error = %err, "token refresh sweep failed");
                }
            })
        })
        .map_err(|e| SchedulerError::JobRegistrationFailed(e.to_string()))?;

        scheduler
            .add(job)
            .await
            .map_err(|e| SchedulerError::JobRegistrationFailed(e.to_string()))?;

        Ok(scheduler)
    }

    /// One sweep: enqueue a refresh job for every credential expiring
    /// within the horizon.
    pub async fn sweep(
        credentials: Arc<dyn CredentialStore>,
        queue: Arc<dyn JobQueue>,
        horizon: chrono::Duration,
    ) -> std::result::Result<usize, String> {
        let cutoff = Utc::now() + horizon;
        let expiring = credentials
            .list_expiring(cutoff)
            .await
            .map_err(|e| format!("listing expiring credentials: {e}"))?;

        if expiring.is_empty() {
            debug!("no credentials need refreshing");
            return Ok(0);
        }

        info!(count = expiring.len(), "sweeping expiring credentials");

        let mut enqueued = 0;
        for credential in expiring {
            let payload = RefreshTokenPayload {
                user_id: credential.user_id.clone(),
                provider: credential.provider,
            };
            let payload_json = match serde_json::to_string(&payload) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize refresh payload");
                    continue;
                }
            };

            // The expiry bucket keeps the key stable across sweeps of the
            // same credential generation.
            let bucket = credential
                .expires_at
                .map(|t| t.timestamp() / 3600)
                .unwrap_or_default();
            let key = idempotency_key(
                &credential.user_id,
                OperationKind::RefreshToken,
                &format!("{}:{}", credential.provider, bucket),
            );

            match queue.enqueue(OperationKind::RefreshToken, payload_json, key).await {
                Ok(_) => enqueued += 1,
                Err(err) => warn!(
                    user = %credential.user_id,
                    provider = %credential.provider,
                    error = %err,
                    "failed to enqueue refresh job"
                ),
            }
        }

        Ok(enqueued)
    }
}
