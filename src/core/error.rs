use std::time::Duration;

use thiserror::Error;

use crate::core::transport::TransportError;

/// The primary error type for all fallible operations in this crate.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The client configuration is invalid (empty URL or key, missing query parameter name,
    /// unusable cache directory, ...).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// One or more option keys are not permitted in the scope they were supplied in.
    #[error("invalid request options: {}", keys.join(", "))]
    InvalidOptions {
        /// Every offending key, sorted.
        keys: Vec<String>,
    },

    /// A header name or value supplied through the options could not be used.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The HTTP method is not in the supported set.
    #[error("unsupported HTTP method: {0}")]
    InvalidMethod(String),

    /// `send` was called before `build`.
    #[error("client has not been built; call `build` before sending requests")]
    ClientNotBuilt,

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A URL could not be parsed or joined.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// No response was received (connect failure, timeout, ...), after any retries.
    #[error("transport error after {retries} retries: {source}")]
    Transport {
        /// The last transport failure.
        #[source]
        source: TransportError,
        /// Retries performed before giving up.
        retries: u32,
    },

    /// The server answered 429 and retries (if any) were exhausted.
    #[error("rate limit exceeded at {url}")]
    RateLimitExceeded {
        /// The URL that was rate limited.
        url: String,
        /// The server's `Retry-After` hint on the final response, if any.
        retry_after: Option<Duration>,
        /// Retries performed before giving up.
        retries: u32,
    },

    /// The server answered with a 5xx status.
    #[error("server error {status} at {url}")]
    ServerError {
        /// The HTTP status code.
        status: u16,
        /// The URL that returned the error.
        url: String,
        /// Retries performed before giving up.
        retries: u32,
    },

    /// The server answered with a 4xx status other than 429.
    #[error("Unexpected response status: {status} at {url}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The URL that returned the error.
        url: String,
        /// Retries performed (always zero for 4xx, which are never retried).
        retries: u32,
    },

    /// The retry sequence was cancelled through the request's cancellation token.
    #[error("request cancelled after {retries} retries")]
    Cancelled {
        /// Retries performed before cancellation.
        retries: u32,
    },

    /// The response body is not valid JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The response body is valid JSON but not of the requested shape.
    #[error("Data format unexpected: {0}")]
    Data(String),
}

impl ApiError {
    /// The number of retries performed before this error was surfaced, for failures
    /// produced by the request pipeline.
    #[must_use]
    pub const fn retries(&self) -> Option<u32> {
        match self {
            Self::Transport { retries, .. }
            | Self::RateLimitExceeded { retries, .. }
            | Self::ServerError { retries, .. }
            | Self::Status { retries, .. }
            | Self::Cancelled { retries } => Some(*retries),
            _ => None,
        }
    }

    /// Whether this error is the distinguished rate-limit failure.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }
}
