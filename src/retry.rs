use std::time::Duration;

use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{
    policies::ExponentialBackoff, Jitter, RetryTransientMiddleware, Retryable, RetryableStrategy,
};

use crate::ClientOptions;

/// Statuses that trigger another attempt.
pub const RETRY_STATUSES: [StatusCode; 4] = [
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

pub fn is_retryable_status(status: StatusCode) -> bool {
    RETRY_STATUSES.contains(&status)
}

/// Retries on [`RETRY_STATUSES`] only.
///
/// Transport errors (refused connection, DNS, timeouts) are fatal.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatusOnlyStrategy;

impl RetryableStrategy for StatusOnlyStrategy {
    fn handle(
        &self,
        res: &Result<reqwest::Response, reqwest_middleware::Error>,
    ) -> Option<Retryable> {
        match res {
            Ok(response) if is_retryable_status(response.status()) => Some(Retryable::Transient),
            Ok(_) => None,
            Err(_) => Some(Retryable::Fatal),
        }
    }
}

/// Smallest and largest delay between attempts.
///
/// Retry `k` waits `retry_backoff_ms * 2^(k-1)`, so the upper bound is the
/// delay of the last permitted retry.
pub fn backoff_bounds(options: &ClientOptions) -> (Duration, Duration) {
    let exp = options.max_retries.saturating_sub(1).min(16);
    let min = options.retry_backoff_ms;
    let max = min.saturating_mul(1u64 << exp);
    (Duration::from_millis(min), Duration::from_millis(max))
}

pub fn backoff_policy(options: &ClientOptions) -> ExponentialBackoff {
    let (min, max) = backoff_bounds(options);
    ExponentialBackoff::builder()
        .retry_bounds(min, max)
        .jitter(Jitter::None)
        .build_with_max_retries(options.max_retries)
}

/// Wraps `http` with the status-only retry middleware.
pub fn with_retries(http: reqwest::Client, options: &ClientOptions) -> ClientWithMiddleware {
    let middleware = RetryTransientMiddleware::new_with_policy_and_strategy(
        backoff_policy(options),
        StatusOnlyStrategy,
    );
    ClientBuilder::new(http).with(middleware).build()
}
