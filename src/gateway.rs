//! Shared HTTP plumbing for the auth, mail, and assistant gateway clients.
//!
//! Bounded retry with exponential backoff, applied only to requests that
//! are safe to repeat (the callers decide; reads and idempotent admin
//! calls use it, sends do not).

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway rejected credentials")]
    Unauthorized,

    #[error("Gateway error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Http(e) => e.is_timeout() || e.is_connect(),
            GatewayError::Api { status, .. } => {
                *status == 429 || *status == 408 || *status >= 500
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries. For fire-and-forget sends.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryDecision {
    Retryable,
    NonRetryable,
}

fn retry_decision_for_status(status: reqwest::StatusCode) -> RetryDecision {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        RetryDecision::Retryable
    } else {
        RetryDecision::NonRetryable
    }
}

fn retry_delay(
    attempt: u32,
    policy: &RetryPolicy,
    retry_after: Option<&reqwest::header::HeaderValue>,
) -> Duration {
    if let Some(value) = retry_after.and_then(|v| v.to_str().ok()) {
        if let Ok(secs) = value.parse::<u64>() {
            return Duration::from_secs(secs.min(30));
        }
    }

    let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
    let base = policy
        .initial_backoff_ms
        .saturating_mul(exponent)
        .min(policy.max_backoff_ms);
    let jitter = (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0))
        % 150;
    Duration::from_millis(base.saturating_add(jitter))
}

/// Send a request, retrying transient failures up to the policy's limit.
/// Only call this with requests that are safe to repeat.
pub async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, GatewayError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let Some(cloned) = request.try_clone() else {
            return request.send().await.map_err(GatewayError::Http);
        };

        match cloned.send().await {
            Ok(response) => {
                let status = response.status();
                if retry_decision_for_status(status) == RetryDecision::Retryable
                    && attempt < attempts
                {
                    let delay = retry_delay(
                        attempt,
                        policy,
                        response.headers().get(reqwest::header::RETRY_AFTER),
                    );
                    log::warn!(
                        "gateway retry {}/{} after status {} (sleep {:?})",
                        attempt,
                        attempts,
                        status,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Ok(response);
            }
            Err(err) => {
                let retryable_transport = err.is_timeout() || err.is_connect();
                if retryable_transport && attempt < attempts {
                    let delay = retry_delay(attempt, policy, None);
                    log::warn!(
                        "gateway retry {}/{} after transport error: {} (sleep {:?})",
                        attempt,
                        attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(GatewayError::Http(err));
            }
        }
    }

    Err(GatewayError::InvalidResponse(
        "request exhausted retries".to_string(),
    ))
}

/// Map a non-success response into a `GatewayError`, consuming the body for
/// the message.
pub async fn error_for_response(response: reqwest::Response) -> GatewayError {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return GatewayError::Unauthorized;
    }
    let message = response.text().await.unwrap_or_default();
    GatewayError::Api {
        status: status.as_u16(),
        message,
    }
}
