//! Per-call and build-time options, plus the allow-list validator.
//!
//! Options can be assembled with the typed builder methods or parsed from a JSON object
//! with [`RequestOptions::from_value`]. Parsed keys the typed struct does not model are kept
//! aside and checked against [`ALLOWED_OPTION_KEYS`] when the options are used.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::client::CacheMode;
use crate::core::error::ApiError;

/// Option keys recognized in either scope.
pub const ALLOWED_OPTION_KEYS: &[&str] = &[
    "allow_redirects",
    "auth",
    "body",
    "cert",
    "connect_timeout",
    "cookies",
    "debug",
    "decode_content",
    "delay",
    "expect",
    "force_ip_resolve",
    "form_params",
    "headers",
    "idn_conversion",
    "json",
    "multipart",
    "on_headers",
    "on_stats",
    "progress",
    "proxy",
    "query",
    "read_timeout",
    "sink",
    "ssl_key",
    "stream",
    "synchronous",
    "verify",
    "timeout",
    "version",
];

/// Library pseudo-options; never reported by [`validate_keys`].
pub const PSEUDO_OPTION_KEYS: &[&str] = &["persistent_headers", "http_errors", "base_uri", "cache_mode"];

/// Keys the client always controls itself. Caller-supplied values are dropped.
pub(crate) const RESERVED_OPTION_KEYS: &[&str] = &["base_uri", "http_errors"];

/// Where a set of options is being applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionScope {
    /// Options passed to `ApiClient::build`; they configure the transport.
    Build,
    /// Options passed with a single request.
    Request,
}

impl OptionScope {
    /// Keys that are meaningful in this scope. Allow-listed keys outside it are ignored.
    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    const fn applicable(self) -> &'static [&'static str] {
        match self {
            Self::Build => &[
                "allow_redirects",
                "cert",
                "connect_timeout",
                "cookies",
                "decode_content",
                "headers",
                "persistent_headers",
                "proxy",
                "read_timeout",
                "ssl_key",
                "timeout",
                "verify",
            ],
            Self::Request => &[
                "auth",
                "body",
                "cache_mode",
                "delay",
                "form_params",
                "headers",
                "json",
                "query",
                "timeout",
                "version",
            ],
        }
    }

    /// Keys that are rejected outright in this scope.
    const fn forbidden(self) -> &'static [&'static str] {
        match self {
            Self::Build => &["query"],
            Self::Request => &["persistent_headers"],
        }
    }
}

/// Checks `keys` against `allow_list`, reporting every key that is neither allowed nor a
/// library pseudo-option.
///
/// # Errors
///
/// Returns [`ApiError::InvalidOptions`] listing all offending keys, sorted and de-duplicated.
pub fn validate_keys<'a, I>(keys: I, allow_list: &[&str]) -> Result<(), ApiError>
where
    I: IntoIterator<Item = &'a str>,
{
    let invalid: BTreeSet<&str> = keys
        .into_iter()
        .filter(|k| !PSEUDO_OPTION_KEYS.contains(k) && !allow_list.contains(k))
        .collect();

    if invalid.is_empty() {
        Ok(())
    } else {
        Err(ApiError::InvalidOptions {
            keys: invalid.into_iter().map(str::to_string).collect(),
        })
    }
}

/// Redirect handling for the transport.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RedirectPolicy {
    /// `true` follows redirects with the transport's default limit, `false` never follows.
    Enabled(bool),
    /// Follows at most `max` redirects.
    Limited {
        /// The redirect limit.
        max: usize,
    },
}

/// The HTTP version to request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum HttpVersion {
    /// HTTP/1.0
    #[serde(rename = "1.0")]
    Http10,
    /// HTTP/1.1
    #[serde(rename = "1.1", alias = "1")]
    Http11,
    /// HTTP/2
    #[serde(rename = "2.0", alias = "2")]
    Http2,
}

impl HttpVersion {
    pub(crate) const fn as_reqwest(self) -> reqwest::Version {
        match self {
            Self::Http10 => reqwest::Version::HTTP_10,
            Self::Http11 => reqwest::Version::HTTP_11,
            Self::Http2 => reqwest::Version::HTTP_2,
        }
    }
}

/// Transport and request options.
///
/// The same type is used for `build` and for individual requests; [`OptionScope`] decides
/// which fields matter and which are rejected.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
    pub(crate) allow_redirects: Option<RedirectPolicy>,
    pub(crate) auth: Option<(String, String)>,
    #[serde(deserialize_with = "de_opt_body")]
    pub(crate) body: Option<Vec<u8>>,
    pub(crate) cert: Option<PathBuf>,
    #[serde(deserialize_with = "de_opt_secs")]
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) cookies: Option<bool>,
    pub(crate) decode_content: Option<bool>,
    #[serde(deserialize_with = "de_opt_millis")]
    pub(crate) delay: Option<Duration>,
    #[serde(deserialize_with = "de_string_map")]
    pub(crate) form_params: BTreeMap<String, String>,
    #[serde(deserialize_with = "de_string_map")]
    pub(crate) headers: BTreeMap<String, String>,
    pub(crate) json: Option<Value>,
    pub(crate) proxy: Option<String>,
    #[serde(deserialize_with = "de_query")]
    pub(crate) query: BTreeMap<String, String>,
    #[serde(deserialize_with = "de_opt_secs")]
    pub(crate) read_timeout: Option<Duration>,
    pub(crate) ssl_key: Option<PathBuf>,
    #[serde(deserialize_with = "de_opt_secs")]
    pub(crate) timeout: Option<Duration>,
    pub(crate) verify: Option<bool>,
    pub(crate) version: Option<HttpVersion>,

    #[serde(deserialize_with = "de_string_map")]
    pub(crate) persistent_headers: BTreeMap<String, String>,
    pub(crate) cache_mode: Option<CacheMode>,

    #[serde(skip)]
    pub(crate) cancel: Option<CancellationToken>,

    /// Keys without a typed field; checked against the allow-list on use.
    #[serde(flatten)]
    pub(crate) extra: BTreeMap<String, Value>,
}

impl RequestOptions {
    /// Empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from a JSON object keyed by option name.
    ///
    /// Keys without a typed field are kept and checked against the allow-list when the
    /// options are validated.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Json`] if a known key has a value of the wrong type.
    pub fn from_value(value: Value) -> Result<Self, ApiError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Drops reserved keys (`base_uri`, `http_errors`); the client controls those itself.
    pub(crate) fn strip_reserved(&mut self) {
        for key in RESERVED_OPTION_KEYS {
            if self.extra.remove(*key).is_some() {
                #[cfg(feature = "tracing")]
                tracing::debug!(key, "dropping reserved option");
            }
        }
    }

    /// Adds a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Adds a query-string parameter.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Sets a raw request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets a JSON request body.
    #[must_use]
    pub fn json(mut self, value: Value) -> Self {
        self.json = Some(value);
        self
    }

    /// Adds a URL-encoded form field.
    #[must_use]
    pub fn form_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form_params.insert(name.into(), value.into());
        self
    }

    /// Sends HTTP basic credentials with the request.
    #[must_use]
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some((username.into(), password.into()));
        self
    }

    /// Overall timeout. Per attempt when set on a request, client-wide when set at build.
    #[must_use]
    pub const fn timeout(mut self, dur: Duration) -> Self {
        self.timeout = Some(dur);
        self
    }

    /// Connect timeout (build only).
    #[must_use]
    pub const fn connect_timeout(mut self, dur: Duration) -> Self {
        self.connect_timeout = Some(dur);
        self
    }

    /// Read timeout (build only).
    #[must_use]
    pub const fn read_timeout(mut self, dur: Duration) -> Self {
        self.read_timeout = Some(dur);
        self
    }

    /// Waits this long before the first attempt.
    #[must_use]
    pub const fn delay(mut self, dur: Duration) -> Self {
        self.delay = Some(dur);
        self
    }

    /// Redirect policy (build only).
    #[must_use]
    pub fn allow_redirects(mut self, policy: RedirectPolicy) -> Self {
        self.allow_redirects = Some(policy);
        self
    }

    /// Routes all traffic through `proxy` (build only).
    #[must_use]
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Enables or disables TLS certificate verification (build only).
    #[must_use]
    pub const fn verify(mut self, verify: bool) -> Self {
        self.verify = Some(verify);
        self
    }

    /// Enables a cookie store (build only).
    #[must_use]
    pub const fn cookies(mut self, enabled: bool) -> Self {
        self.cookies = Some(enabled);
        self
    }

    /// Enables transparent gzip/brotli/deflate decoding (build only).
    #[must_use]
    pub const fn decode_content(mut self, enabled: bool) -> Self {
        self.decode_content = Some(enabled);
        self
    }

    /// Client certificate PEM file (build only).
    #[must_use]
    pub fn cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.cert = Some(path.into());
        self
    }

    /// Private key PEM file paired with [`cert`](Self::cert) (build only).
    #[must_use]
    pub fn ssl_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.ssl_key = Some(path.into());
        self
    }

    /// Requests a specific HTTP version.
    #[must_use]
    pub const fn version(mut self, version: HttpVersion) -> Self {
        self.version = Some(version);
        self
    }

    /// Adds a header applied to every request sent by the built client (build only).
    #[must_use]
    pub fn persistent_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.persistent_headers.insert(name.into(), value.into());
        self
    }

    /// Sets the cache mode for this request.
    #[must_use]
    pub const fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = Some(mode);
        self
    }

    /// Lets the caller abort the retry sequence of this request.
    #[must_use]
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Names of every option that is set.
    pub(crate) fn present_keys(&self) -> Vec<&str> {
        let typed = [
            ("allow_redirects", self.allow_redirects.is_some()),
            ("auth", self.auth.is_some()),
            ("body", self.body.is_some()),
            ("cert", self.cert.is_some()),
            ("connect_timeout", self.connect_timeout.is_some()),
            ("cookies", self.cookies.is_some()),
            ("decode_content", self.decode_content.is_some()),
            ("delay", self.delay.is_some()),
            ("form_params", !self.form_params.is_empty()),
            ("headers", !self.headers.is_empty()),
            ("json", self.json.is_some()),
            ("proxy", self.proxy.is_some()),
            ("query", !self.query.is_empty()),
            ("read_timeout", self.read_timeout.is_some()),
            ("ssl_key", self.ssl_key.is_some()),
            ("timeout", self.timeout.is_some()),
            ("verify", self.verify.is_some()),
            ("version", self.version.is_some()),
            ("persistent_headers", !self.persistent_headers.is_empty()),
            ("cache_mode", self.cache_mode.is_some()),
        ];
        typed
            .into_iter()
            .filter_map(|(k, set)| set.then_some(k))
            .chain(self.extra.keys().map(String::as_str))
            .collect()
    }

    /// Validates these options for `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidOptions`] listing every key that is unknown or forbidden
    /// in `scope`.
    pub fn validate(&self, scope: OptionScope) -> Result<(), ApiError> {
        let keys = self.present_keys();
        let forbidden = scope.forbidden();

        let mut invalid: BTreeSet<String> = keys
            .iter()
            .filter(|k| forbidden.contains(*k))
            .map(|k| (*k).to_string())
            .collect();
        if let Err(ApiError::InvalidOptions { keys: unknown }) = validate_keys(keys.iter().copied(), ALLOWED_OPTION_KEYS) {
            invalid.extend(unknown);
        }
        if !invalid.is_empty() {
            return Err(ApiError::InvalidOptions {
                keys: invalid.into_iter().collect(),
            });
        }

        #[cfg(feature = "tracing")]
        for key in keys.iter().filter(|k| !scope.applicable().contains(*k)) {
            tracing::debug!(key, ?scope, "option has no effect in this scope; ignoring");
        }

        Ok(())
    }
}

/// Converts a name/value map to a header map.
pub(crate) fn header_map(pairs: &BTreeMap<String, String>) -> Result<HeaderMap, ApiError> {
    let mut map = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ApiError::InvalidHeader(format!("invalid header name `{name}`")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| ApiError::InvalidHeader(format!("invalid value for header `{name}`")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/* ---------------- serde helpers ---------------- */

fn scalar_to_string(v: Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn de_string_map<'de, D>(d: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Value>::deserialize(d)?;
    raw.into_iter()
        .map(|(k, v)| {
            scalar_to_string(v)
                .map(|s| (k.clone(), s))
                .ok_or_else(|| serde::de::Error::custom(format!("`{k}` must be a string, number or bool")))
        })
        .collect()
}

/// A pre-encoded query string would bypass key injection; only the map form is honored.
fn de_query<'de, D>(d: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(d)? {
        Value::String(_raw) => {
            #[cfg(feature = "tracing")]
            tracing::debug!("dropping raw query string option; pass query parameters as a map");
            Ok(BTreeMap::new())
        }
        Value::Null => Ok(BTreeMap::new()),
        other => de_string_map(other).map_err(serde::de::Error::custom),
    }
}

fn de_opt_body<'de, D>(d: D) -> Result<Option<Vec<u8>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(d)?.map(String::into_bytes))
}

fn de_opt_secs<'de, D>(d: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<f64>::deserialize(d)? {
        Some(s) if s.is_finite() && s >= 0.0 => Ok(Some(Duration::from_secs_f64(s))),
        Some(s) => Err(serde::de::Error::custom(format!("invalid number of seconds: {s}"))),
        None => Ok(None),
    }
}

fn de_opt_millis<'de, D>(d: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
}
