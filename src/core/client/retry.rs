//! Retry policy: when to retry and how long to wait.
//!
//! Both decisions are plain functions of their inputs so the loop in the dispatcher owns the
//! only mutable state (the retry count), and so delays stay deterministic for a given attempt.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};

use super::constants::{DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX, DEFAULT_MAX_RETRIES};
use crate::core::models::ApiResponse;
use crate::core::transport::TransportError;

/// Specifies the backoff strategy used when the server gives no `Retry-After` hint.
#[derive(Clone, Debug, PartialEq)]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed(Duration),
    /// Uses an exponential delay between retries.
    /// The delay is calculated as `base * (factor ^ retries)`, capped at `max`.
    Exponential {
        /// The delay before the first retry.
        base: Duration,
        /// The multiplicative factor for each subsequent retry. Values below 1 are treated as 1.
        factor: f64,
        /// The maximum duration to wait between retries.
        max: Duration,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: DEFAULT_BACKOFF_BASE,
            factor: 2.0,
            max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl Backoff {
    /// The delay before retry number `retries + 1`.
    ///
    /// Non-decreasing in `retries` and deterministic.
    #[must_use]
    pub fn delay(&self, retries: u32) -> Duration {
        match self {
            Self::Fixed(d) => *d,
            Self::Exponential { base, factor, max } => {
                let factor = if factor.is_nan() { 1.0 } else { factor.max(1.0) };
                let exp = i32::try_from(retries).unwrap_or(i32::MAX);
                let ms = (base.as_millis() as f64) * factor.powi(exp);
                let cap = max.as_millis() as f64;
                // inf.min(cap) == cap, so overflow lands on the ceiling
                Duration::from_millis(ms.min(cap).max(0.0) as u64)
            }
        }
    }
}

/// Configuration for the automatic retry mechanism.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Enables or disables the retry mechanism. Disabled by default.
    pub enabled: bool,
    /// The maximum number of retries to attempt. The total number of attempts will be `max_retries + 1`.
    pub max_retries: u32,
    /// The backoff strategy to use between retries.
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    /// The bound actually in force: zero when retries are disabled.
    #[must_use]
    pub const fn effective_max(&self) -> u32 {
        if self.enabled { self.max_retries } else { 0 }
    }
}

/// The outcome of the retry decision after an attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait and try again.
    Retry,
    /// The bound was reached; surface the last outcome unchanged.
    GiveUp,
    /// The outcome is final (success or a non-retryable failure).
    Stop,
}

/// Whether a status is worth retrying: any 5xx, or 429.
#[must_use]
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Decides what to do after an attempt, given how many retries were already made.
#[must_use]
pub fn decide(retries: u32, max_retries: u32, outcome: &Result<ApiResponse, TransportError>) -> RetryDecision {
    let retryable = match outcome {
        Ok(resp) => is_retryable_status(resp.status()),
        Err(e) => e.is_connection_failure(),
    };
    if !retryable {
        RetryDecision::Stop
    } else if retries >= max_retries {
        RetryDecision::GiveUp
    } else {
        RetryDecision::Retry
    }
}

/// Parses a `Retry-After` header relative to `now`.
///
/// Numeric values are seconds; anything else is read as an HTTP date, with past dates
/// clamping to zero. Returns `None` if the header is absent or unparseable.
#[must_use]
pub fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        let secs: u64 = value.parse().ok()?;
        return Some(Duration::from_secs(secs));
    }

    let target = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    let secs = (target - now).num_seconds().max(0);
    Some(Duration::from_secs(u64::try_from(secs).unwrap_or(0)))
}

/// Computes the wait before the next attempt.
///
/// A `Retry-After` header on the last response wins; otherwise the backoff curve for
/// `retries` is used. Does not sleep.
#[must_use]
pub fn retry_delay(retries: u32, headers: Option<&HeaderMap>, backoff: &Backoff) -> Duration {
    retry_delay_at(retries, headers, backoff, Utc::now())
}

pub(crate) fn retry_delay_at(
    retries: u32,
    headers: Option<&HeaderMap>,
    backoff: &Backoff,
    now: DateTime<Utc>,
) -> Duration {
    headers
        .and_then(|h| retry_after(h, now))
        .unwrap_or_else(|| backoff.delay(retries))
}
