//! Request-mutating middleware applied, in order, before every dispatch.

use std::fmt;

use reqwest::header::HeaderMap;

use crate::core::transport::TransportRequest;

/// Mutates an outgoing request.
pub trait RequestMiddleware: Send + Sync + fmt::Debug {
    /// Applies this middleware to `request`.
    fn apply(&self, request: &mut TransportRequest);
}

/// Build-time `headers`: inserted only where the request does not already set them.
#[derive(Debug, Clone)]
pub struct DefaultHeaders(pub HeaderMap);

impl RequestMiddleware for DefaultHeaders {
    fn apply(&self, request: &mut TransportRequest) {
        for (name, value) in &self.0 {
            if !request.headers.contains_key(name) {
                request.headers.insert(name.clone(), value.clone());
            }
        }
    }
}

/// `persistent_headers` (and the header-mode API key): always win over per-request headers.
#[derive(Debug, Clone)]
pub struct PersistentHeaders(pub HeaderMap);

impl RequestMiddleware for PersistentHeaders {
    fn apply(&self, request: &mut TransportRequest) {
        for (name, value) in &self.0 {
            request.headers.insert(name.clone(), value.clone());
        }
    }
}
