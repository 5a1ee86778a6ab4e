//! Shared retry-with-backoff helper for outbound model-backend requests.

use rand::Rng;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::warn;

/// How a request closure is retried.
///
/// Delay for attempt `n` (1-based) is `base_delay * 2^(n-1)`, capped at
/// `max_delay`, plus a small random jitter so simultaneous callers do not
/// stampede the upstream in lockstep.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A fast policy for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1u32 << (attempt.saturating_sub(1)).min(16));
        let capped = exp.min(self.max_delay);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=250));
        capped + jitter
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Run a request closure with retries on rate limits (429, honoring
/// `Retry-After`), 5xx server errors and network faults.
///
/// Returns the last response — even one with an error status, so the
/// caller can classify the body — or the final network error once
/// `max_attempts` is exhausted.
pub async fn send_with_retry<F, Fut>(
    policy: &RetryPolicy,
    mut request: F,
) -> Result<reqwest::Response, String>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match request().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() || !is_retryable(status) || attempt >= policy.max_attempts {
                    return Ok(response);
                }

                // Retry-After, when present, overrides the computed backoff.
                let delay = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| policy.delay_for(attempt));

                warn!(
                    %status,
                    attempt,
                    max_attempts = policy.max_attempts,
                    ?delay,
                    "request rejected upstream, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if attempt >= policy.max_attempts {
                    return Err(format!(
                        "network request failed after {} attempts: {}",
                        attempt, e
                    ));
                }
                let delay = policy.delay_for(attempt);
                warn!(error = %e, attempt, ?delay, "network error, backing off");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
