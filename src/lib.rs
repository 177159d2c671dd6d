//! apiwrap: a configurable HTTP API client wrapper.
//!
//! Give it a base URL and an API key; it normalizes endpoint paths, attaches the key as a
//! header or query parameter, caches cacheable GET/HEAD responses on disk, and retries
//! connection failures, 5xx and 429 responses with backoff (honoring `Retry-After`).
//!
//! ```no_run
//! use apiwrap::{ApiClient, ClientConfig, RequestOptions};
//!
//! # async fn run() -> Result<(), apiwrap::ApiError> {
//! let config = ClientConfig::builder()
//!     .api_url("https://api.example.com/v1")
//!     .api_key("secret")
//!     .build()?;
//!
//! let mut client = ApiClient::new(config);
//! client.build(RequestOptions::new().persistent_header("Accept", "application/json"))?;
//! client.enable_retry_attempts();
//!
//! let resp = client.get("/items", RequestOptions::new().query("page", "2")).await?;
//! let body = resp.to_map()?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use crate::core::client::{
    ApiKeyTransport, Backoff, CacheEntry, CacheMode, CacheScope, CacheStore, FileCacheStore, RetryConfig,
};
pub use crate::core::options::{HttpVersion, RedirectPolicy};
pub use crate::core::{
    ApiClient, ApiError, ApiResponse, CacheStatus, ClientConfig, ClientConfigBuilder, HttpMethod, RequestOptions,
    Transport, TransportError, TransportErrorKind, TransportRequest,
};

#[cfg(feature = "tracing-subscriber")]
/// Installs a `tracing` fmt subscriber driven by `RUST_LOG`. Intended for tests and demos.
pub fn init_tracing_for_tests() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
