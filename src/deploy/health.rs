// ABOUTME: HTTP health checks run as curl on the remote host.
// ABOUTME: Polls with a fixed interval until a 2xx response or retries run out.

use std::time::Duration;

use crate::config::HealthcheckConfig;
use crate::remote::{ExecError, Executor, Step, StepKind, quote};

/// Outcome of polling a health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthOutcome {
    pub healthy: bool,
    pub attempts: u32,
}

/// Polls `http://localhost:<port><path>` on the remote host.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    url: String,
    timeout: Duration,
    retries: u32,
    interval: Duration,
}

impl HealthChecker {
    pub fn new(url: impl Into<String>, timeout: Duration, retries: u32, interval: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            retries: retries.max(1),
            interval,
        }
    }

    pub fn from_config(config: &HealthcheckConfig, port: u16) -> Self {
        Self::new(
            format!("http://localhost:{}{}", port, config.path),
            config.timeout,
            config.retries,
            config.interval,
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One attempt: exits 0 only for a 2xx status.
    pub fn check_step(&self) -> Step {
        Step::new(
            StepKind::HealthCheck,
            format!(
                "code=$(curl -s -o /dev/null --max-time {} -w '%{{http_code}}' {}) && [ \"${{code%??}}\" = 2 ]",
                self.timeout.as_secs_f64(),
                quote(&self.url)
            ),
        )
    }

    /// Check until healthy or `retries` attempts have failed.
    ///
    /// Non-2xx responses and refused connections count the same. Transport
    /// errors reaching the host are returned as errors.
    pub async fn check<E: Executor + ?Sized>(&self, exec: &E) -> Result<HealthOutcome, ExecError> {
        let step = self.check_step();

        for attempt in 1..=self.retries {
            let output = exec.run(&step).await?;
            if output.success() {
                tracing::debug!("{} healthy after {} attempt(s)", self.url, attempt);
                return Ok(HealthOutcome {
                    healthy: true,
                    attempts: attempt,
                });
            }

            tracing::debug!(
                "{} not healthy yet (attempt {}/{})",
                self.url,
                attempt,
                self.retries
            );
            if attempt < self.retries && !self.interval.is_zero() {
                tokio::time::sleep(self.interval).await;
            }
        }

        Ok(HealthOutcome {
            healthy: false,
            attempts: self.retries,
        })
    }
}
