//! Background job executor.
//!
//! Pulls due job records from the durable store and runs them through a
//! dispatcher, with at-most-once side effects per idempotency key: the
//! claim is an atomic status transition, duplicate submissions collapse at
//! enqueue time, and a succeeded record's cached result is returned without
//! re-invoking the operation. Failures are classified by the domain error
//! taxonomy: transient ones reschedule with exponential backoff up to the
//! attempt ceiling, permanent ones go terminal immediately.
//!
//! Lifecycle mirrors the rest of the workers: join handles are tracked,
//! cancellation is explicit, and batch processing is wrapped in a timeout.

mod dispatcher;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use calbridge_common::RetryStrategy;
use calbridge_core::ports::JobStore;
use calbridge_domain::constants::JOB_MAX_ATTEMPTS;
use calbridge_domain::{JobRecord, Result};
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub use dispatcher::LiveDispatcher;

/// Configuration for the job executor.
#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// Maximum number of jobs to process per batch
    pub batch_size: usize,
    /// Interval between polling attempts
    pub poll_interval: Duration,
    /// Timeout for processing a single batch
    pub processing_timeout: Duration,
    /// Join timeout when stopping
    pub join_timeout: Duration,
    /// Backoff policy for retryable failures
    pub retry: RetryStrategy,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            poll_interval: Duration::from_secs(5),
            processing_timeout: Duration::from_secs(120),
            join_timeout: Duration::from_secs(5),
            retry: RetryStrategy::new()
                .with_max_attempts(JOB_MAX_ATTEMPTS)
                .with_base_delay(Duration::from_secs(2))
                .with_max_delay(Duration::from_secs(300)),
        }
    }
}

/// Executes one claimed job and returns its result document.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, job: &JobRecord) -> Result<serde_json::Value>;
}

/// Job executor with explicit lifecycle management.
pub struct JobExecutor {
    store: Arc<dyn JobStore>,
    dispatcher: Arc<dyn JobDispatcher>,
    config: JobExecutorConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl JobExecutor {
    pub fn new(
        store: Arc<dyn JobStore>,
        dispatcher: Arc<dyn JobDispatcher>,
        config: JobExecutorConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Start the executor, spawning the background processing task.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(calbridge_domain::CalbridgeError::InvalidInput(
                "executor already running".into(),
            ));
        }

        info!("Starting job executor");

        self.cancellation = CancellationToken::new();

        let store = Arc::clone(&self.store);
        let dispatcher = Arc::clone(&self.dispatcher);
        let config = self.config.clone();
        let cancel = self.cancellation.clone();

        let handle = tokio::spawn(async move {
            Self::process_loop(store, dispatcher, config, cancel).await;
        });

        self.task_handle = Some(handle);
        info!("Job executor started");
        Ok(())
    }

    /// Stop the executor and wait for the processing task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            return Err(calbridge_domain::CalbridgeError::InvalidInput(
                "executor not running".into(),
            ));
        }

        info!("Stopping job executor");
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(self.config.join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Executor task panicked: {}", e);
                    return Err(calbridge_domain::CalbridgeError::Internal(
                        "executor task panicked".into(),
                    ));
                }
                Err(_) => {
                    warn!("Executor task did not complete within timeout");
                    return Err(calbridge_domain::CalbridgeError::Internal(
                        "executor join timeout".into(),
                    ));
                }
            }
        }

        info!("Job executor stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true when an executor instance is active.
    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    async fn process_loop(
        store: Arc<dyn JobStore>,
        dispatcher: Arc<dyn JobDispatcher>,
        config: JobExecutorConfig,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Job executor process loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(config.poll_interval) => {
                    match tokio::time::timeout(
                        config.processing_timeout,
                        Self::process_batch(&store, &dispatcher, &config),
                    )
                    .await
                    {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => error!(error = %e, "Batch processing failed"),
                        Err(_) => warn!(
                            timeout_secs = config.processing_timeout.as_secs(),
                            "Batch processing timed out"
                        ),
                    }
                }
            }
        }
    }

    /// Process a single batch of due jobs.
    pub async fn process_batch(
        store: &Arc<dyn JobStore>,
        dispatcher: &Arc<dyn JobDispatcher>,
        config: &JobExecutorConfig,
    ) -> std::result::Result<(), String> {
        let jobs = store
            .fetch_due(config.batch_size)
            .await
            .map_err(|e| format!("failed to fetch due jobs: {e}"))?;

        if jobs.is_empty() {
            debug!("No due jobs to process");
            return Ok(());
        }

        info!(count = jobs.len(), "Processing job batch");

        let mut fatal_errors: Vec<String> = Vec::new();

        for job in jobs {
            let key = job.idempotency_key.clone();

            // Atomic claim: a competing worker (or a terminal transition
            // that raced the fetch) loses here and skips the job.
            match store.claim(&key).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(job = %key, "job already claimed; skipping");
                    continue;
                }
                Err(err) => {
                    fatal_errors.push(format!("claim failed for {key}: {err}"));
                    continue;
                }
            }

            let attempts = job.attempt_count + 1;
            match dispatcher.dispatch(&job).await {
                Ok(result) => {
                    debug!(job = %key, attempts, "job succeeded");
                    if let Err(err) = store.mark_succeeded(&key, &result.to_string()).await {
                        warn!(job = %key, error = %err, "mark_succeeded failed");
                        fatal_errors.push(format!("mark_succeeded error for {key}: {err}"));
                    }
                }
                Err(err) => {
                    let reason = truncate_reason(&err.to_string());
                    let outcome = if !err.is_retryable() {
                        warn!(job = %key, error = %err, "permanent failure; job terminal");
                        store.mark_terminal(&key, &reason).await
                    } else if config.retry.allows_retry(attempts) {
                        let delay = err
                            .retry_after()
                            .unwrap_or_else(|| config.retry.delay_for(attempts));
                        let next = Utc::now()
                            + chrono::Duration::from_std(delay)
                                .unwrap_or_else(|_| chrono::Duration::seconds(2));
                        warn!(
                            job = %key,
                            attempts,
                            next_attempt = %next,
                            error = %err,
                            "transient failure; retry scheduled"
                        );
                        store.mark_retry(&key, &reason, next).await
                    } else {
                        // Retries exhausted: surfaced to the user as a
                        // delivery failure.
                        warn!(job = %key, attempts, error = %err, "retries exhausted; job terminal");
                        store.mark_terminal(&key, &reason).await
                    };

                    if let Err(mark_err) = outcome {
                        warn!(job = %key, error = %mark_err, "status update failed");
                        fatal_errors.push(format!("status update error for {key}: {mark_err}"));
                    }
                }
            }
        }

        if !fatal_errors.is_empty() {
            return Err(fatal_errors.join("; "));
        }
        Ok(())
    }
}

fn truncate_reason(reason: &str) -> String {
    const MAX_LEN: usize = 256;
    if reason.len() <= MAX_LEN {
        return reason.to_string();
    }
    let mut truncated = reason.chars().take(MAX_LEN.saturating_sub(3)).collect::<String>();
    truncated.push_str("...");
    truncated
}

impl Drop for JobExecutor {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("JobExecutor dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}
