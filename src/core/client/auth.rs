//! API key placement: query parameter injection and the persistent auth header.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use super::config::ClientConfig;
use crate::core::error::ApiError;
use crate::core::options::RequestOptions;

/// Where the API key travels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiKeyTransport {
    /// As a header on every request, installed once at build time.
    Header(HeaderName),
    /// As a query-string parameter, merged into every request.
    Query(String),
}

impl ClientConfig {
    /// Applies query-mode auth to per-request options.
    ///
    /// Reserved keys are stripped first. The key is added only when the caller did not
    /// supply the same parameter; header mode is a no-op here.
    pub(crate) fn inject_auth(&self, opts: &mut RequestOptions) {
        opts.strip_reserved();
        if let ApiKeyTransport::Query(param) = self.key_transport() {
            opts.query
                .entry(param.clone())
                .or_insert_with(|| self.api_key().to_string());
        }
    }

    /// Headers to install as persistent headers at build time.
    pub(crate) fn auth_headers(&self) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        if let ApiKeyTransport::Header(name) = self.key_transport() {
            let mut value = HeaderValue::from_str(self.api_key())
                .map_err(|_| ApiError::Config("API key is not a valid header value".into()))?;
            value.set_sensitive(true);
            headers.insert(name.clone(), value);
        }
        Ok(headers)
    }

    /// Renders `url` with the API key parameter masked, for error messages.
    pub(crate) fn redact(&self, url: &Url) -> String {
        let ApiKeyTransport::Query(param) = self.key_transport() else {
            return url.to_string();
        };
        if !url.query_pairs().any(|(k, _)| k == param.as_str()) {
            return url.to_string();
        }
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| {
                let v = if k == param.as_str() { "REDACTED".into() } else { v.into_owned() };
                (k.into_owned(), v)
            })
            .collect();
        let mut masked = url.clone();
        masked.query_pairs_mut().clear().extend_pairs(pairs);
        masked.to_string()
    }
}
