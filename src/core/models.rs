use std::fmt;
use std::str::FromStr;

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use url::Url;

use crate::core::error::ApiError;

/// The supported HTTP methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// `GET`; cacheable.
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
    /// `HEAD`; cacheable.
    Head,
    /// `OPTIONS`
    Options,
    /// `PATCH`
    Patch,
}

impl HttpMethod {
    /// Canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
        }
    }

    /// Whether responses to this method may be served from the cache.
    #[must_use]
    pub const fn is_cacheable(self) -> bool {
        matches!(self, Self::Get | Self::Head)
    }

    pub(crate) fn to_reqwest(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Delete => Method::DELETE,
            Self::Head => Method::HEAD,
            Self::Options => Method::OPTIONS,
            Self::Patch => Method::PATCH,
        }
    }
}

impl FromStr for HttpMethod {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "PATCH" => Ok(Self::Patch),
            _ => Err(ApiError::InvalidMethod(s.to_string())),
        }
    }
}

impl AsRef<str> for HttpMethod {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a response came from the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from the cache store; the transport was not called.
    Hit,
    /// Fetched live with the cache layer active.
    Miss,
    /// Fetched live with no cache involvement.
    Bypass,
}

/// A fully buffered HTTP response plus metadata about how it was obtained.
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Vec<u8>,
    pub(crate) url: Url,
    pub(crate) retries: u32,
    pub(crate) cache_status: CacheStatus,
}

impl ApiResponse {
    /// Creates a response as a transport would produce it.
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>, url: Url) -> Self {
        Self {
            status,
            headers,
            body,
            url,
            retries: 0,
            cache_status: CacheStatus::Bypass,
        }
    }

    /// The HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The final request URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// How many retries the call performed before this response was obtained.
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.retries
    }

    /// Whether this response was served from the cache.
    #[must_use]
    pub const fn cache_status(&self) -> CacheStatus {
        self.cache_status
    }

    /// The raw body bytes.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.body
    }

    /// Consumes the response, returning the body bytes.
    #[must_use]
    pub fn into_raw(self) -> Vec<u8> {
        self.body
    }

    /// The body as UTF-8 text, with invalid sequences replaced.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body as a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Json`] if the body is not valid JSON.
    pub fn to_value(&self) -> Result<Value, ApiError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Decodes the body as a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Json`] if the body is not valid JSON, or [`ApiError::Data`] if it is
    /// valid JSON but not an object.
    pub fn to_map(&self) -> Result<Map<String, Value>, ApiError> {
        match self.to_value()? {
            Value::Object(map) => Ok(map),
            other => Err(ApiError::Data(format!("expected a JSON object, got {}", json_kind(&other)))),
        }
    }

    /// Decodes the body into any deserializable type.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Json`] if the body is not valid JSON or does not match `T`.
    pub fn to_object<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

const fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
