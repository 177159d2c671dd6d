//! Public client surface: construction, build step, dispatch and retry controls.
//! Internals are split into `auth` (API key placement), `cache` (response cache layer),
//! `config` (validated settings), `middleware` (request mutation), `retry` (policy) and
//! `constants` (defaults).

mod auth;
mod cache;
mod config;
pub(crate) mod constants;
mod middleware;
mod retry;

pub use auth::ApiKeyTransport;
pub use cache::{CacheEntry, CacheMode, CacheScope, CacheStore, FileCacheStore};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use middleware::{DefaultHeaders, PersistentHeaders, RequestMiddleware};
pub use retry::{Backoff, RetryConfig, RetryDecision, decide, is_retryable_status, retry_after, retry_delay};

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::Utc;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::endpoint;
use crate::core::error::ApiError;
use crate::core::models::{ApiResponse, CacheStatus, HttpMethod};
use crate::core::options::{OptionScope, RequestOptions, header_map};
use crate::core::transport::{ReqwestTransport, Transport, TransportError, TransportRequest};
use cache::ResponseCache;

/// The transport and middleware produced by [`ApiClient::build`].
#[derive(Debug, Clone)]
struct Built {
    transport: Arc<dyn Transport>,
    middleware: Vec<Arc<dyn RequestMiddleware>>,
}

/// A configured API client.
///
/// Construct it from a [`ClientConfig`], call [`build`](Self::build) once to set up the
/// transport, then issue requests. One call runs to completion (all retries included)
/// before it resolves; the client never dispatches requests concurrently on its own.
#[derive(Debug, Clone)]
pub struct ApiClient {
    config: Arc<ClientConfig>,
    retry: RetryConfig,
    cache: Option<ResponseCache>,
    custom_transport: Option<Arc<dyn Transport>>,
    built: Option<Built>,
}

impl ApiClient {
    /// Creates an unbuilt client. Caching is active when the config has a cache directory.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let cache = config.cache_dir().map(|dir| {
            let store: Arc<dyn CacheStore> = Arc::new(FileCacheStore::new(dir));
            ResponseCache::new(store, config.api_key())
        });
        Self {
            config: Arc::new(config),
            retry: RetryConfig::default(),
            cache,
            custom_transport: None,
            built: None,
        }
    }

    /// Creates an unbuilt client that will dispatch through `transport` instead of reqwest.
    ///
    /// Transport-level build options (proxy, TLS, timeouts) are then the transport's concern;
    /// headers and persistent headers still apply.
    #[must_use]
    pub fn with_transport(config: ClientConfig, transport: impl Transport + 'static) -> Self {
        let mut client = Self::new(config);
        client.custom_transport = Some(Arc::new(transport));
        client
    }

    /// Replaces the cache store, enabling caching even without a cache directory.
    #[must_use]
    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(ResponseCache::new(store, self.config.api_key()));
        self
    }

    /// The configuration this client was created with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether responses may be cached.
    #[must_use]
    pub const fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Whether [`build`](Self::build) has been called.
    #[must_use]
    pub const fn is_built(&self) -> bool {
        self.built.is_some()
    }

    /* -------- retry controls -------- */

    /// Turns automatic retries on.
    pub fn enable_retry_attempts(&mut self) {
        self.retry.enabled = true;
    }

    /// Turns automatic retries off (the default).
    pub fn disable_retry_attempts(&mut self) {
        self.retry.enabled = false;
    }

    /// Sets the retry bound (default 5). Has no effect while retries are disabled.
    pub fn set_max_retry_attempts(&mut self, n: u32) {
        self.retry.max_retries = n;
    }

    /// Replaces the whole retry configuration.
    pub fn set_retry_config(&mut self, config: RetryConfig) {
        self.retry = config;
    }

    /// The retry configuration in force.
    #[must_use]
    pub const fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /* -------- build -------- */

    /// Sets up the transport and the request middleware. Calling it again replaces both.
    ///
    /// Build-time `headers` become defaults; `persistent_headers` (and the API key in header
    /// mode) are forced onto every request.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidOptions`] for unknown keys or a `query` key,
    /// [`ApiError::InvalidHeader`] for malformed headers, and [`ApiError::Config`] /
    /// [`ApiError::Http`] if the transport cannot be created.
    pub fn build(&mut self, options: RequestOptions) -> Result<(), ApiError> {
        let mut options = options;
        options.strip_reserved();
        options.validate(OptionScope::Build)?;

        let defaults = header_map(&options.headers)?;
        let mut persistent = header_map(&options.persistent_headers)?;
        persistent.extend(self.config.auth_headers()?);

        let transport: Arc<dyn Transport> = match &self.custom_transport {
            Some(t) => Arc::clone(t),
            None => Arc::new(ReqwestTransport::from_options(&options)?),
        };

        let mut middleware: Vec<Arc<dyn RequestMiddleware>> = Vec::new();
        if !defaults.is_empty() {
            middleware.push(Arc::new(DefaultHeaders(defaults)));
        }
        if !persistent.is_empty() {
            middleware.push(Arc::new(PersistentHeaders(persistent)));
        }

        self.built = Some(Built { transport, middleware });
        Ok(())
    }

    /* -------- dispatch -------- */

    /// Sends a request to `endpoint` (relative to the base URL).
    ///
    /// `method` is matched case-insensitively against GET, POST, PUT, DELETE, HEAD, OPTIONS
    /// and PATCH. Statuses of 400 and above become errors once retries are exhausted.
    ///
    /// # Errors
    ///
    /// - [`ApiError::InvalidMethod`] for an unsupported method.
    /// - [`ApiError::InvalidOptions`] / [`ApiError::InvalidHeader`] for bad options.
    /// - [`ApiError::ClientNotBuilt`] if [`build`](Self::build) was not called.
    /// - [`ApiError::RateLimitExceeded`] if the final response is a 429.
    /// - [`ApiError::ServerError`], [`ApiError::Status`], [`ApiError::Transport`] for other
    ///   failures, and [`ApiError::Cancelled`] if the cancellation token fires.
    pub async fn send(
        &self,
        method: impl AsRef<str>,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let method: HttpMethod = method.as_ref().parse()?;
        self.dispatch(method, endpoint, options).await
    }

    /// Sends a GET request.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn get(&self, endpoint: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.dispatch(HttpMethod::Get, endpoint, options).await
    }

    /// Sends a POST request.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn post(&self, endpoint: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.dispatch(HttpMethod::Post, endpoint, options).await
    }

    /// Sends a PUT request.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn put(&self, endpoint: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.dispatch(HttpMethod::Put, endpoint, options).await
    }

    /// Sends a DELETE request.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn delete(&self, endpoint: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.dispatch(HttpMethod::Delete, endpoint, options).await
    }

    /// Sends a PATCH request.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn patch(&self, endpoint: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.dispatch(HttpMethod::Patch, endpoint, options).await
    }

    /// Sends a HEAD request.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn head(&self, endpoint: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        self.dispatch(HttpMethod::Head, endpoint, options).await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, options), err))]
    async fn dispatch(
        &self,
        method: HttpMethod,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let mut options = options;
        self.config.inject_auth(&mut options);
        options.validate(OptionScope::Request)?;
        let built = self.built.as_ref().ok_or(ApiError::ClientNotBuilt)?;

        let mut request = self.prepare(method, endpoint, &options)?;
        for m in &built.middleware {
            m.apply(&mut request);
        }

        let cache_mode = options.cache_mode.unwrap_or_default();
        let cache = self.cache.as_ref().map(|c| {
            let mode = ResponseCache::mode_for(method, &request.headers, cache_mode);
            (c, c.key(method, &request.url, &request.headers), mode)
        });

        if let Some((c, key, mode)) = &cache
            && let Some(hit) = c.lookup(key, &request.url, *mode).await
        {
            return self.classify(Ok(hit), 0, &request.url);
        }

        if let Some(d) = options.delay {
            tokio::time::sleep(d).await;
        }

        let url = request.url.clone();
        let (outcome, retries) = self
            .run_with_retry(built.transport.as_ref(), request, options.cancel.as_ref())
            .await?;

        let outcome = match (outcome, &cache) {
            (Ok(mut resp), Some((c, key, mode))) => {
                c.store(key, &resp, *mode).await;
                resp.cache_status = if *mode == CacheMode::Bypass {
                    CacheStatus::Bypass
                } else {
                    CacheStatus::Miss
                };
                Ok(resp)
            }
            (other, _) => other,
        };

        self.classify(outcome, retries, &url)
    }

    /// Resolves URL, headers and body for one call.
    fn prepare(&self, method: HttpMethod, endpoint: &str, opts: &RequestOptions) -> Result<TransportRequest, ApiError> {
        let mut url = Url::parse(&endpoint::join(self.config.base_url(), endpoint))?;
        if !opts.query.is_empty() {
            let mut qp = url.query_pairs_mut();
            for (k, v) in &opts.query {
                qp.append_pair(k, v);
            }
        }

        let mut headers = header_map(&opts.headers)?;

        if let Some((user, pass)) = &opts.auth {
            let mut value = HeaderValue::from_str(&format!("Basic {}", B64.encode(format!("{user}:{pass}"))))
                .map_err(|_| ApiError::InvalidHeader("basic auth credentials are not a valid header value".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let body = encode_body(opts, &mut headers)?;

        Ok(TransportRequest {
            method: method.to_reqwest(),
            url,
            headers,
            body,
            timeout: opts.timeout,
            version: opts.version.map(|v| v.as_reqwest()),
        })
    }

    /// The retry loop. Returns the final outcome and how many retries were made; only
    /// cancellation is an error here.
    async fn run_with_retry(
        &self,
        transport: &dyn Transport,
        request: TransportRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<(Result<ApiResponse, TransportError>, u32), ApiError> {
        let max_retries = self.retry.effective_max();
        let mut retries = 0u32;

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(ApiError::Cancelled { retries });
            }

            let outcome = transport.send(request.clone()).await;

            match decide(retries, max_retries, &outcome) {
                RetryDecision::Stop => return Ok((outcome, retries)),
                RetryDecision::GiveUp => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(retries, "retry bound reached; giving up");
                    return Ok((outcome, retries));
                }
                RetryDecision::Retry => {
                    let delay = retry_delay(retries, outcome.as_ref().ok().map(ApiResponse::headers), &self.retry.backoff);

                    #[cfg(feature = "tracing")]
                    match &outcome {
                        Ok(resp) => tracing::info!(attempt = retries + 1, status = resp.status().as_u16(), ?delay, "retrying"),
                        Err(e) => tracing::info!(attempt = retries + 1, error = %e, ?delay, "retrying"),
                    }

                    if !wait(delay, cancel).await {
                        return Err(ApiError::Cancelled { retries });
                    }
                    retries += 1;
                }
            }
        }
    }

    /// Maps the final outcome onto success or a typed failure.
    fn classify(
        &self,
        outcome: Result<ApiResponse, TransportError>,
        retries: u32,
        url: &Url,
    ) -> Result<ApiResponse, ApiError> {
        let mut resp = outcome.map_err(|source| ApiError::Transport { source, retries })?;
        resp.retries = retries;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::RateLimitExceeded {
                url: self.config.redact(url),
                retry_after: retry_after(resp.headers(), Utc::now()),
                retries,
            });
        }
        if status.is_server_error() {
            return Err(ApiError::ServerError {
                status: status.as_u16(),
                url: self.config.redact(url),
                retries,
            });
        }
        if status.is_client_error() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: self.config.redact(url),
                retries,
            });
        }
        Ok(resp)
    }
}

/// Encodes at most one of `json`, `form_params` and `body`, setting a content type if absent.
fn encode_body(opts: &RequestOptions, headers: &mut HeaderMap) -> Result<Option<Vec<u8>>, ApiError> {
    let set: Vec<&str> = [
        ("body", opts.body.is_some()),
        ("form_params", !opts.form_params.is_empty()),
        ("json", opts.json.is_some()),
    ]
    .into_iter()
    .filter_map(|(k, present)| present.then_some(k))
    .collect();
    if set.len() > 1 {
        return Err(ApiError::InvalidOptions {
            keys: set.into_iter().map(str::to_string).collect(),
        });
    }

    if let Some(json) = &opts.json {
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        return Ok(Some(serde_json::to_vec(json)?));
    }
    if !opts.form_params.is_empty() {
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/x-www-form-urlencoded"));
        }
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&opts.form_params)
            .finish();
        return Ok(Some(encoded.into_bytes()));
    }
    Ok(opts.body.clone())
}

/// Sleeps for `delay`, returning `false` if `cancel` fires first.
async fn wait(delay: Duration, cancel: Option<&CancellationToken>) -> bool {
    match cancel {
        Some(token) => tokio::select! {
            () = tokio::time::sleep(delay) => true,
            () = token.cancelled() => false,
        },
        None => {
            tokio::time::sleep(delay).await;
            true
        }
    }
}
