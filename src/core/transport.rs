//! The HTTP transport capability and its reqwest implementation.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::header::HeaderMap;
use reqwest::{Method, Version};
use url::Url;

use crate::core::client::constants::USER_AGENT;
use crate::core::error::ApiError;
use crate::core::models::ApiResponse;
use crate::core::options::{RedirectPolicy, RequestOptions};

/// A fully resolved outgoing request, as handed to a [`Transport`].
#[derive(Clone, Debug)]
pub struct TransportRequest {
    /// The HTTP method.
    pub method: Method,
    /// The absolute URL, query string included.
    pub url: Url,
    /// Request headers after all middleware has run.
    pub headers: HeaderMap,
    /// The encoded body, if any.
    pub body: Option<Vec<u8>>,
    /// Per-attempt timeout.
    pub timeout: Option<Duration>,
    /// Requested HTTP version.
    pub version: Option<Version>,
}

/// What kind of failure prevented a response from being received.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// DNS resolution or connection establishment failed.
    Connect,
    /// The attempt timed out.
    Timeout,
    /// Anything else (request construction, body I/O, protocol errors).
    Other,
}

/// A transport-level failure: no usable response was received.
#[derive(Debug)]
pub struct TransportError {
    kind: TransportErrorKind,
    source: Box<dyn StdError + Send + Sync>,
}

impl TransportError {
    /// Wraps an arbitrary error with a kind.
    pub fn new(kind: TransportErrorKind, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    /// The failure kind.
    #[must_use]
    pub const fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Whether the failure happened before any response was received.
    #[must_use]
    pub const fn is_connection_failure(&self) -> bool {
        matches!(self.kind, TransportErrorKind::Connect | TransportErrorKind::Timeout)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Other => "transport",
        };
        write!(f, "{kind} error: {}", self.source)
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.source)
    }
}

// the request URL is dropped: in query mode it carries the API key
impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            TransportErrorKind::Timeout
        } else if e.is_connect() {
            TransportErrorKind::Connect
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, e.without_url())
    }
}

/// Sends one request and returns whatever response arrived, regardless of status.
///
/// Implementations must not retry, cache or interpret statuses; the client layers those on top.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Performs a single attempt.
    fn send(&self, request: TransportRequest) -> BoxFuture<'_, Result<ApiResponse, TransportError>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, request: TransportRequest) -> BoxFuture<'_, Result<ApiResponse, TransportError>> {
        (**self).send(request)
    }
}

/// The default transport, backed by a `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// Wraps an existing client.
    #[must_use]
    pub const fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Builds a client from build-scope options.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] if a certificate or key file cannot be read, or
    /// [`ApiError::Http`] if reqwest rejects the configuration (bad proxy URL, bad PEM, ...).
    pub fn from_options(opts: &RequestOptions) -> Result<Self, ApiError> {
        let mut httpb = reqwest::Client::builder().user_agent(USER_AGENT);

        if let Some(t) = opts.timeout {
            httpb = httpb.timeout(t);
        }
        if let Some(ct) = opts.connect_timeout {
            httpb = httpb.connect_timeout(ct);
        }
        if let Some(rt) = opts.read_timeout {
            httpb = httpb.read_timeout(rt);
        }
        if let Some(policy) = &opts.allow_redirects {
            httpb = httpb.redirect(match policy {
                RedirectPolicy::Enabled(true) => reqwest::redirect::Policy::default(),
                RedirectPolicy::Enabled(false) => reqwest::redirect::Policy::none(),
                RedirectPolicy::Limited { max } => reqwest::redirect::Policy::limited(*max),
            });
        }
        if let Some(proxy) = &opts.proxy {
            httpb = httpb.proxy(reqwest::Proxy::all(proxy.as_str())?);
        }
        if let Some(verify) = opts.verify {
            httpb = httpb.danger_accept_invalid_certs(!verify);
        }
        if let Some(cookies) = opts.cookies {
            httpb = httpb.cookie_store(cookies);
        }
        if let Some(decode) = opts.decode_content {
            httpb = httpb.gzip(decode).brotli(decode).deflate(decode);
        }
        if let Some(cert) = &opts.cert {
            let mut pem = std::fs::read(cert)
                .map_err(|e| ApiError::Config(format!("cannot read cert {}: {e}", cert.display())))?;
            if let Some(key) = &opts.ssl_key {
                let key_pem = std::fs::read(key)
                    .map_err(|e| ApiError::Config(format!("cannot read ssl_key {}: {e}", key.display())))?;
                pem.push(b'\n');
                pem.extend_from_slice(&key_pem);
            }
            httpb = httpb.identity(reqwest::Identity::from_pem(&pem)?);
        }

        Ok(Self::new(httpb.build()?))
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: TransportRequest) -> BoxFuture<'_, Result<ApiResponse, TransportError>> {
        Box::pin(async move {
            let TransportRequest {
                method,
                url,
                headers,
                body,
                timeout,
                version,
            } = request;

            let mut req = self.http.request(method, url).headers(headers);
            if let Some(body) = body {
                req = req.body(body);
            }
            if let Some(t) = timeout {
                req = req.timeout(t);
            }
            if let Some(v) = version {
                req = req.version(v);
            }

            let resp = req.send().await?;
            crate::core::net::read_response(resp).await
        })
    }
}
