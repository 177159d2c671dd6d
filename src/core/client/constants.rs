//! Centralized constants for defaults and UA.

use std::time::Duration;

/// User agent sent by the default transport.
pub(crate) const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Retry bound used until `set_max_retry_attempts` is called.
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 5;

/// First delay of the default exponential backoff.
pub(crate) const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Ceiling of the default exponential backoff.
pub(crate) const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Header carrying the API key when header transport is selected and no name is given.
pub(crate) const DEFAULT_API_KEY_HEADER: &str = "X-Api-Key";

/// Request headers folded into cache keys.
pub(crate) const CACHE_VARY_HEADERS: &[&str] = &["accept", "accept-encoding"];

/// Upper bound on how long a response may stay cached, whatever the server asks for.
pub(crate) const MAX_CACHE_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);
