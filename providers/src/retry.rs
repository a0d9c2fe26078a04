//! HTTP retry with exponential backoff for Gemini requests.
//!
//! Policy:
//!
//! - 2 retries after the initial attempt
//! - 500 ms initial delay, doubling per retry, capped at 8 s
//! - down-jitter of up to 25% (multiplier in `[0.75, 1.0]`)
//! - `Retry-After-Ms` / `Retry-After` win over backoff when under 60 s
//!
//! Retryable: connection errors, HTTP 408, 409, 429 and 5xx. The server can force
//! or forbid a retry with `x-should-retry: true|false`.
//!
//! Every attempt carries the same `Idempotency-Key` and an `X-Retry-Count` header
//! (0 for the initial request).

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode, header::HeaderMap};
use uuid::Uuid;

const RETRY_AFTER_CEILING: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the initial request.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Down-jitter fraction (0.25 = up to 25% shorter).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter_factor: 0.25,
        }
    }
}

fn within_ceiling(delay: Duration) -> Option<Duration> {
    (delay > Duration::ZERO && delay < RETRY_AFTER_CEILING).then_some(delay)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Server-requested delay from `Retry-After-Ms` (float ms) or `Retry-After` (whole seconds).
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let from_ms = header_str(headers, "retry-after-ms")
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|ms| ms.is_finite() && *ms > 0.0)
        .and_then(|ms| within_ceiling(Duration::from_secs_f64(ms / 1000.0)));
    if from_ms.is_some() {
        return from_ms;
    }

    header_str(headers, "retry-after")
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .and_then(|secs| within_ceiling(Duration::from_secs(secs)))
}

#[must_use]
pub fn should_retry(status: StatusCode, headers: &HeaderMap) -> bool {
    match header_str(headers, "x-should-retry") {
        Some(value) if value.eq_ignore_ascii_case("true") => return true,
        Some(value) if value.eq_ignore_ascii_case("false") => return false,
        _ => {}
    }

    matches!(status.as_u16(), 408 | 409 | 429 | 500..=599)
}

/// Delay before retry number `backoff_step + 1`.
#[must_use]
pub fn calculate_retry_delay(
    backoff_step: u32,
    config: &RetryConfig,
    headers: Option<&HeaderMap>,
) -> Duration {
    if let Some(delay) = headers.and_then(parse_retry_after) {
        return delay;
    }

    let exponent = i32::try_from(backoff_step).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());
    let jitter = 1.0 - rand::random::<f64>() * config.jitter_factor;
    Duration::from_secs_f64(capped * jitter)
}

fn prepare_attempt(
    builder: RequestBuilder,
    retry_count: u32,
    idempotency_key: &str,
    timeout: Option<Duration>,
) -> RequestBuilder {
    let builder = builder
        .header("X-Retry-Count", retry_count.to_string())
        .header("Idempotency-Key", idempotency_key);
    match timeout {
        Some(timeout) => builder.timeout(timeout),
        None => builder,
    }
}

#[must_use]
pub fn generate_idempotency_key() -> String {
    format!("bodycode-retry-{}", Uuid::new_v4())
}

/// How a retried request ended.
#[derive(Debug)]
pub enum RetryOutcome {
    /// 2xx response.
    Success(Response),
    /// Non-2xx response that was not (or no longer) retryable. Kept for the error body.
    HttpError(Response),
    /// Transport failure after at least one retry.
    ConnectionError {
        attempts: u32,
        source: reqwest::Error,
    },
    /// Transport failure on the first attempt that could not be retried.
    NonRetryable(reqwest::Error),
}

impl RetryOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Send a request, rebuilding it with `build_request` for each attempt.
///
/// `timeout` bounds each attempt as a whole; streaming requests pass `None` and rely
/// on the SSE idle timeout instead.
pub async fn send_with_retry<F>(
    build_request: F,
    timeout: Option<Duration>,
    config: &RetryConfig,
) -> RetryOutcome
where
    F: Fn() -> RequestBuilder,
{
    let idempotency_key = generate_idempotency_key();
    let mut attempt = 0u32;

    loop {
        let request = prepare_attempt(build_request(), attempt, &idempotency_key, timeout);
        let retries_left = attempt < config.max_retries;

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                return RetryOutcome::Success(response);
            }
            Ok(response) => {
                let status = response.status();
                if !retries_left || !should_retry(status, response.headers()) {
                    return RetryOutcome::HttpError(response);
                }
                let delay = calculate_retry_delay(attempt, config, Some(response.headers()));
                drop(response);
                tracing::debug!(
                    %status,
                    retry_count = attempt + 1,
                    delay_ms = delay.as_millis(),
                    "Retrying request after error status"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                if retries_left && is_retryable_error(&error) {
                    let delay = calculate_retry_delay(attempt, config, None);
                    tracing::debug!(
                        %error,
                        retry_count = attempt + 1,
                        delay_ms = delay.as_millis(),
                        "Retrying request after connection error"
                    );
                    tokio::time::sleep(delay).await;
                } else if attempt == 0 {
                    return RetryOutcome::NonRetryable(error);
                } else {
                    return RetryOutcome::ConnectionError {
                        attempts: attempt + 1,
                        source: error,
                    };
                }
            }
        }

        attempt += 1;
    }
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}
