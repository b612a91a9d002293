//! HTTP client with built-in retry and timeout support.
//!
//! Transport-level resilience only: 5xx responses and connection failures
//! are retried with exponential backoff, everything else is returned to the
//! caller for taxonomy classification.

use std::time::Duration;

use calbridge_common::RetryStrategy;
use calbridge_domain::{CalbridgeError, Result};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response};
use tracing::debug;

use crate::errors::InfraError;

/// Retrying HTTP client shared by all connectors.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    max_attempts: u32,
    retry: RetryStrategy,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a request builder using the underlying reqwest client.
    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Execute the request with retry semantics.
    ///
    /// The builder must carry a replayable body; use [`Self::send_once`] for
    /// streaming or multipart bodies.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let attempts = self.max_attempts.max(1);

        for attempt in 1..=attempts {
            let cloned = builder.try_clone().ok_or_else(|| {
                CalbridgeError::Internal(
                    "request body cannot be cloned; buffer the body to enable retries".into(),
                )
            })?;

            match cloned.send().await {
                Ok(response) => {
                    let status = response.status();
                    debug!(attempt, %status, "received HTTP response");

                    if status.is_server_error() && attempt < attempts {
                        tokio::time::sleep(self.retry.delay_for(attempt)).await;
                        continue;
                    }
                    return Ok(response);
                }
                Err(err) => {
                    debug!(attempt, error = %err, "HTTP request failed");
                    let transient = err.is_timeout() || err.is_connect();
                    if transient && attempt < attempts {
                        tokio::time::sleep(self.retry.delay_for(attempt)).await;
                        continue;
                    }
                    return Err(InfraError::from(err).into());
                }
            }
        }

        Err(CalbridgeError::Internal(
            "http client exhausted retries without producing a result".into(),
        ))
    }

    /// Execute the request exactly once. Multipart bodies cannot be
    /// replayed, so they bypass the retry loop.
    pub async fn send_once(&self, builder: RequestBuilder) -> Result<Response> {
        builder.send().await.map_err(|err| InfraError::from(err).into())
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    max_attempts: u32,
    base_backoff: Duration,
    user_agent: Option<String>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            user_agent: None,
        }
    }
}

impl HttpClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configure the total number of attempts (initial try + retries).
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn build(self) -> Result<HttpClient> {
        let mut builder = ReqwestClient::builder().timeout(self.timeout);
        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }
        let client = builder
            .build()
            .map_err(|e| CalbridgeError::Config(format!("failed to build HTTP client: {e}")))?;

        let retry = RetryStrategy::new()
            .with_max_attempts(self.max_attempts)
            .with_base_delay(self.base_backoff)
            .with_max_delay(Duration::from_secs(10));

        Ok(HttpClient { client, max_attempts: self.max_attempts, retry })
    }
}
