//! Client configuration: base URL, API key and its placement, optional cache directory.

use std::fmt;
use std::path::{Path, PathBuf};

use reqwest::header::HeaderName;
use serde::Deserialize;
use url::Url;

use super::auth::ApiKeyTransport;
use super::constants::DEFAULT_API_KEY_HEADER;
use crate::core::error::ApiError;

/// Validated, immutable client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    base_url: String,
    api_key: String,
    key_transport: ApiKeyTransport,
    cache_dir: Option<PathBuf>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("key_transport", &self.key_transport)
            .field("cache_dir", &self.cache_dir)
            .finish()
    }
}

impl ClientConfig {
    /// Create a new builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Builds a configuration from a JSON object using the external key names
    /// (`apiUrl`, `apiKey`, `cachePath`, `apiRequiresQuery`, `apiParamName`, `apiKeyHeader`).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] for unknown keys, wrongly typed values or any failed
    /// validation rule.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ApiError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase", deny_unknown_fields)]
        struct Raw {
            api_url: Option<String>,
            api_key: Option<String>,
            cache_path: Option<PathBuf>,
            #[serde(default)]
            api_requires_query: bool,
            api_param_name: Option<String>,
            api_key_header: Option<String>,
        }

        let raw: Raw = serde_json::from_value(value).map_err(|e| ApiError::Config(e.to_string()))?;
        ClientConfigBuilder {
            api_url: raw.api_url,
            api_key: raw.api_key,
            cache_path: raw.cache_path,
            api_requires_query: raw.api_requires_query,
            api_param_name: raw.api_param_name,
            api_key_header: raw.api_key_header,
        }
        .build()
    }

    /// The base URL exactly as configured.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Where the API key is sent.
    #[must_use]
    pub const fn key_transport(&self) -> &ApiKeyTransport {
        &self.key_transport
    }

    /// The cache directory, if caching is enabled.
    #[must_use]
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }
}

/* ----------------------- Builder ----------------------- */

#[derive(Default)]
pub struct ClientConfigBuilder {
    api_url: Option<String>,
    api_key: Option<String>,
    cache_path: Option<PathBuf>,
    api_requires_query: bool,
    api_param_name: Option<String>,
    api_key_header: Option<String>,
}

impl fmt::Debug for ClientConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfigBuilder")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("cache_path", &self.cache_path)
            .field("api_requires_query", &self.api_requires_query)
            .field("api_param_name", &self.api_param_name)
            .field("api_key_header", &self.api_key_header)
            .finish()
    }
}

impl ClientConfigBuilder {
    /// The API base URL (required, http or https).
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    /// The API key (required).
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Enables response caching in `dir`, which must exist and be writable.
    pub fn cache_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(dir.into());
        self
    }

    /// Sends the key as a query parameter instead of a header. Requires
    /// [`api_param_name`](Self::api_param_name).
    pub const fn api_requires_query(mut self, yes: bool) -> Self {
        self.api_requires_query = yes;
        self
    }

    /// The query parameter carrying the key in query mode.
    pub fn api_param_name(mut self, name: impl Into<String>) -> Self {
        self.api_param_name = Some(name.into());
        self
    }

    /// The header carrying the key in header mode. Default: `X-Api-Key`.
    pub fn api_key_header(mut self, name: impl Into<String>) -> Self {
        self.api_key_header = Some(name.into());
        self
    }

    /// Validates and freezes the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] if the URL is missing, empty or not http(s), if the key
    /// is missing or empty, if query mode lacks a parameter name, if the header name is
    /// invalid, or if the cache directory does not exist or is not writable.
    pub fn build(self) -> Result<ClientConfig, ApiError> {
        let base_url = self
            .api_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ApiError::Config("apiUrl is required".into()))?;
        let parsed = Url::parse(&base_url).map_err(|e| ApiError::Config(format!("apiUrl is not a valid URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::Config(format!(
                "apiUrl must use http or https, got `{}`",
                parsed.scheme()
            )));
        }

        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ApiError::Config("apiKey is required".into()))?;

        let key_transport = if self.api_requires_query {
            let param = self
                .api_param_name
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .ok_or_else(|| ApiError::Config("apiParamName is required when apiRequiresQuery is set".into()))?;
            ApiKeyTransport::Query(param)
        } else {
            let name = self.api_key_header.as_deref().unwrap_or(DEFAULT_API_KEY_HEADER);
            let name = HeaderName::from_bytes(name.trim().as_bytes())
                .map_err(|_| ApiError::Config(format!("apiKeyHeader `{name}` is not a valid header name")))?;
            ApiKeyTransport::Header(name)
        };

        let cache_dir = self.cache_path.map(|p| check_cache_dir(&p).map(|()| p)).transpose()?;

        Ok(ClientConfig {
            base_url,
            api_key,
            key_transport,
            cache_dir,
        })
    }
}

fn check_cache_dir(dir: &Path) -> Result<(), ApiError> {
    let meta = std::fs::metadata(dir)
        .map_err(|e| ApiError::Config(format!("cachePath {} is not accessible: {e}", dir.display())))?;
    if !meta.is_dir() {
        return Err(ApiError::Config(format!("cachePath {} is not a directory", dir.display())));
    }

    // permission bits lie under root and ACLs; probe with a real write
    let probe = dir.join(format!(".apiwrap-probe-{}", std::process::id()));
    std::fs::write(&probe, b"")
        .map_err(|e| ApiError::Config(format!("cachePath {} is not writable: {e}", dir.display())))?;
    let _ = std::fs::remove_file(&probe);
    Ok(())
}
