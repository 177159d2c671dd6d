//! Response cache layer.
//!
//! Responses to GET/HEAD requests are stored when the server grants an explicit freshness
//! window. `public` responses go to the shared scope, everything else to a private scope
//! keyed by a fingerprint of the API key. Lookups try private first. Store errors are
//! logged and swallowed: caching is best-effort.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as B64;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use reqwest::StatusCode;
use reqwest::header::{CACHE_CONTROL, EXPIRES, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use super::constants::{CACHE_VARY_HEADERS, MAX_CACHE_TTL};
use crate::core::models::{ApiResponse, CacheStatus, HttpMethod};

/// Defines how a single request interacts with the response cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Read from the cache if a fresh entry is present; otherwise, fetch from the network
    /// and write the response to the cache if it is cacheable. (Default)
    #[default]
    Use,
    /// Always fetch from the network, bypassing any cached entry, and write the new response to the cache.
    Refresh,
    /// Always fetch from the network and do not read from or write to the cache.
    Bypass,
}

impl CacheMode {
    const fn reads(self) -> bool {
        matches!(self, Self::Use)
    }

    const fn writes(self) -> bool {
        matches!(self, Self::Use | Self::Refresh)
    }
}

/// A stored response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// HTTP status code.
    pub status: u16,
    /// Response headers (UTF-8 values only).
    pub headers: Vec<(String, String)>,
    /// Response body.
    #[serde(with = "b64")]
    pub body: Vec<u8>,
}

impl CacheEntry {
    fn from_response(resp: &ApiResponse) -> Self {
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        Self {
            status: resp.status().as_u16(),
            headers,
            body: resp.raw().to_vec(),
        }
    }

    fn into_response(self, url: Url) -> Option<ApiResponse> {
        let status = StatusCode::from_u16(self.status).ok()?;
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (k, v) in self.headers {
            let (Ok(name), Ok(value)) = (HeaderName::from_bytes(k.as_bytes()), HeaderValue::from_str(&v)) else {
                continue;
            };
            headers.append(name, value);
        }
        Some(ApiResponse::new(status, headers, self.body, url))
    }
}

mod b64 {
    use super::B64;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&B64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        B64.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// Key/value storage with per-entry time-to-live.
///
/// Expiry is the store's job: `get` must not return entries past their TTL.
pub trait CacheStore: Send + Sync + fmt::Debug {
    /// Fetches a live entry.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, io::Result<Option<CacheEntry>>>;
    /// Stores an entry for `ttl`.
    fn put<'a>(&'a self, key: &'a str, entry: CacheEntry, ttl: Duration) -> BoxFuture<'a, io::Result<()>>;
}

/// Distinguishes temp files of concurrent writes within one process.
static TMP_NONCE: AtomicU64 = AtomicU64::new(0);

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    stored_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    entry: CacheEntry,
}

/// A [`CacheStore`] keeping one JSON file per entry in a directory.
///
/// File names are the hex SHA-256 of the key, so keys (which may embed credentials) never
/// reach the disk.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    /// Uses `dir`, which must already exist.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The backing directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{:x}.json", Sha256::digest(key.as_bytes())))
    }
}

impl CacheStore for FileCacheStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, io::Result<Option<CacheEntry>>> {
        Box::pin(async move {
            let path = self.path_for(key);
            let bytes = match tokio::fs::read(&path).await {
                Ok(b) => b,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e),
            };
            let stored: StoredEntry =
                serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

            if Utc::now() >= stored.expires_at {
                // stale; a failed removal only means the next lookup repeats this
                let _ = tokio::fs::remove_file(&path).await;
                return Ok(None);
            }
            Ok(Some(stored.entry))
        })
    }

    fn put<'a>(&'a self, key: &'a str, entry: CacheEntry, ttl: Duration) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            let stored_at = Utc::now();
            let expires_at = chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|ttl| stored_at.checked_add_signed(ttl))
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("ttl {ttl:?} out of range")))?;
            let record = StoredEntry {
                stored_at,
                expires_at,
                entry,
            };
            let bytes = serde_json::to_vec(&record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

            let path = self.path_for(key);
            let nonce = TMP_NONCE.fetch_add(1, Ordering::Relaxed);
            let tmp = path.with_extension(format!("{}-{nonce}.tmp", std::process::id()));
            tokio::fs::write(&tmp, bytes).await?;
            tokio::fs::rename(&tmp, &path).await
        })
    }
}

/// Which cache scope an entry belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheScope {
    /// Specific to the calling credential.
    Private,
    /// Reusable across credentials.
    Shared,
}

/// Parsed `Cache-Control` directives (only the ones this layer acts on).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct CacheControl {
    pub no_store: bool,
    pub no_cache: bool,
    pub private: bool,
    pub public: bool,
    pub max_age: Option<u64>,
    pub s_maxage: Option<u64>,
}

impl CacheControl {
    pub(crate) fn parse(headers: &HeaderMap) -> Self {
        let mut cc = Self::default();
        for value in headers.get_all(CACHE_CONTROL) {
            let Ok(value) = value.to_str() else { continue };
            for directive in value.split(',') {
                let directive = directive.trim();
                let (name, arg) = match directive.split_once('=') {
                    Some((n, a)) => (n.trim(), Some(a.trim().trim_matches('"'))),
                    None => (directive, None),
                };
                match name.to_ascii_lowercase().as_str() {
                    "no-store" => cc.no_store = true,
                    "no-cache" => cc.no_cache = true,
                    // `private="field"` only restricts fields; treat it as private anyway
                    "private" => cc.private = true,
                    "public" => cc.public = true,
                    "max-age" => cc.max_age = arg.and_then(|a| a.parse().ok()),
                    "s-maxage" => cc.s_maxage = arg.and_then(|a| a.parse().ok()),
                    _ => {}
                }
            }
        }
        cc
    }
}

/// Statuses that may be stored when the server grants freshness.
pub(crate) fn is_cacheable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 200 | 203 | 204 | 300 | 301 | 404 | 410)
}

/// Picks the scope a response belongs to and how long it stays fresh there.
///
/// Returns `None` for responses that must not be stored.
pub(crate) fn storage_policy(headers: &HeaderMap, now: DateTime<Utc>) -> Option<(CacheScope, Duration)> {
    let cc = CacheControl::parse(headers);
    if cc.no_store || cc.no_cache {
        return None;
    }

    let scope = if cc.public && !cc.private {
        CacheScope::Shared
    } else {
        CacheScope::Private
    };

    let secs = match scope {
        CacheScope::Shared => cc.s_maxage.or(cc.max_age),
        CacheScope::Private => cc.max_age,
    }
    .or_else(|| {
        let expires = headers.get(EXPIRES)?.to_str().ok()?;
        let at = DateTime::parse_from_rfc2822(expires).ok()?.with_timezone(&Utc);
        u64::try_from((at - now).num_seconds()).ok()
    })?;

    (secs > 0).then(|| (scope, Duration::from_secs(secs).min(MAX_CACHE_TTL)))
}

/// Canonical keys of one request in both scopes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CacheKey {
    pub private: String,
    pub shared: String,
}

impl CacheKey {
    pub(crate) fn new(method: HttpMethod, url: &Url, request_headers: &HeaderMap, fingerprint: &str) -> Self {
        let mut base = format!("{method} {url}");
        for name in CACHE_VARY_HEADERS {
            let value = request_headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            base.push_str(&format!("\n{name}: {value}"));
        }
        Self {
            private: format!("private:{fingerprint}\n{base}"),
            shared: format!("shared\n{base}"),
        }
    }

    const fn for_scope(&self, scope: CacheScope) -> &String {
        match scope {
            CacheScope::Private => &self.private,
            CacheScope::Shared => &self.shared,
        }
    }
}

/// Hex SHA-256 of a credential, used to partition the private scope.
pub(crate) fn fingerprint(secret: &str) -> String {
    format!("{:x}", Sha256::digest(secret.as_bytes()))
}

/// The cache layer sitting in front of the retry loop.
#[derive(Clone, Debug)]
pub(crate) struct ResponseCache {
    store: Arc<dyn CacheStore>,
    fingerprint: String,
}

impl ResponseCache {
    pub(crate) fn new(store: Arc<dyn CacheStore>, api_key: &str) -> Self {
        Self {
            store,
            fingerprint: fingerprint(api_key),
        }
    }

    /// Whether a request may touch the cache at all, and how.
    pub(crate) fn mode_for(method: HttpMethod, request_headers: &HeaderMap, mode: CacheMode) -> CacheMode {
        if !method.is_cacheable() {
            return CacheMode::Bypass;
        }
        let cc = CacheControl::parse(request_headers);
        if cc.no_store {
            CacheMode::Bypass
        } else if cc.no_cache && mode == CacheMode::Use {
            CacheMode::Refresh
        } else {
            mode
        }
    }

    pub(crate) fn key(&self, method: HttpMethod, url: &Url, request_headers: &HeaderMap) -> CacheKey {
        CacheKey::new(method, url, request_headers, &self.fingerprint)
    }

    /// Looks the request up, private scope first.
    pub(crate) async fn lookup(&self, key: &CacheKey, url: &Url, mode: CacheMode) -> Option<ApiResponse> {
        if !mode.reads() {
            return None;
        }
        for scope in [CacheScope::Private, CacheScope::Shared] {
            match self.store.get(key.for_scope(scope)).await {
                Ok(Some(entry)) => {
                    if let Some(mut resp) = entry.into_response(url.clone()) {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(?scope, path = url.path(), "cache hit");
                        resp.cache_status = CacheStatus::Hit;
                        return Some(resp);
                    }
                }
                Ok(None) => {}
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %_e, ?scope, "cache read failed; continuing without cache");
                }
            }
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(path = url.path(), "cache miss");
        None
    }

    /// Stores the response if it is cacheable.
    pub(crate) async fn store(&self, key: &CacheKey, resp: &ApiResponse, mode: CacheMode) {
        if !mode.writes() || !is_cacheable_status(resp.status()) {
            return;
        }
        let Some((scope, ttl)) = storage_policy(resp.headers(), Utc::now()) else {
            return;
        };
        let entry = CacheEntry::from_response(resp);
        match self.store.put(key.for_scope(scope), entry, ttl).await {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(?scope, ttl_secs = ttl.as_secs(), "response cached");
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, ?scope, "cache write failed; response not cached");
            }
        }
    }
}
