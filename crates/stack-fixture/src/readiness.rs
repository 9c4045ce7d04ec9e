//! Readiness polling for timing-dependent startup.
//!
//! The stack reports itself started before the application necessarily
//! serves requests. `wait_for_ready` polls a health check at a fixed interval
//! until it succeeds or the total budget runs out.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};

/// Readiness errors.
#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("Service at {url} did not become ready within {} seconds", .timeout.as_secs())]
    Timeout { url: String, timeout: Duration },

    #[error("Failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Polling budget for a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Total time allowed from the first attempt (default: 120s).
    pub timeout: Duration,

    /// Sleep between attempts (default: 5s).
    pub interval: Duration,

    /// Upper bound on a single request (default: 5s).
    pub request_timeout: Duration,

    /// Status code that counts as ready (default: 200).
    pub expected_status: u16,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            expected_status: 200,
        }
    }
}

/// A single readiness check.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Target being checked, used in logs and errors.
    fn target(&self) -> &str;

    /// One attempt. Any failure is "not ready yet".
    async fn is_ready(&self) -> bool;
}

/// Checks an HTTP endpoint with GET and compares the status code.
pub struct HttpHealthCheck {
    url: String,
    expected_status: u16,
    http_client: reqwest::Client,
}

impl HttpHealthCheck {
    /// Create a check for `url` using the policy's request timeout and expected status.
    pub fn new(url: impl Into<String>, policy: &ReadinessPolicy) -> Result<Self, ReadinessError> {
        let http_client = reqwest::Client::builder()
            .timeout(policy.request_timeout)
            .build()?;

        Ok(Self {
            url: url.into(),
            expected_status: policy.expected_status,
            http_client,
        })
    }
}

#[async_trait]
impl HealthCheck for HttpHealthCheck {
    fn target(&self) -> &str {
        &self.url
    }

    async fn is_ready(&self) -> bool {
        match self.http_client.get(&self.url).send().await {
            Ok(response) if response.status().as_u16() == self.expected_status => true,
            Ok(response) => {
                tracing::debug!(url = %self.url, status = %response.status(), "Health check not ready");
                false
            }
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "Health check request failed");
                false
            }
        }
    }
}

/// Wait until `check` reports ready, or fail once `policy.timeout` has elapsed.
///
/// The deadline is measured from the first attempt. An attempt is made only
/// while elapsed time is below the timeout, so the error is never raised
/// before `timeout`. An attempt started just before the deadline can run for
/// the full request timeout and is still followed by one interval of sleep,
/// so the worst case is `timeout + request_timeout + interval`.
pub async fn wait_for_ready<P>(check: &P, policy: &ReadinessPolicy) -> Result<(), ReadinessError>
where
    P: HealthCheck + ?Sized,
{
    let start = Instant::now();
    let mut attempt: u32 = 0;

    while start.elapsed() < policy.timeout {
        attempt += 1;
        if check.is_ready().await {
            tracing::info!(
                url = %check.target(),
                attempt,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Service is ready"
            );
            return Ok(());
        }

        sleep(policy.interval).await;
    }

    tracing::error!(
        url = %check.target(),
        attempts = attempt,
        timeout_secs = policy.timeout.as_secs(),
        "Service did not become ready"
    );

    Err(ReadinessError::Timeout {
        url: check.target().to_string(),
        timeout: policy.timeout,
    })
}
