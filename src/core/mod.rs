//! Core components of the `apiwrap` client.
//!
//! This module contains the foundational building blocks of the library, including:
//! - The main [`ApiClient`], its configuration and the request pipeline (auth, cache, retry).
//! - The primary [`ApiError`] type.
//! - Request options and their allow-list validation.
//! - The [`Transport`] capability and its reqwest implementation.

/// The main client (`ApiClient`), configuration, cache layer and retry policy.
pub mod client;
/// Joining endpoint paths onto the base URL.
pub mod endpoint;
/// The primary error type (`ApiError`) for the crate.
pub mod error;
/// Shared data models (`ApiResponse`, `HttpMethod`, ...).
pub mod models;
/// Per-call and build-time options.
pub mod options;
/// The HTTP transport capability.
pub mod transport;

pub(crate) mod net;

// convenient re-exports so most code can just `use crate::core::ApiClient`
pub use client::{ApiClient, ClientConfig, ClientConfigBuilder};
pub use error::ApiError;
pub use models::{ApiResponse, CacheStatus, HttpMethod};
pub use options::{OptionScope, RequestOptions};
pub use transport::{ReqwestTransport, Transport, TransportError, TransportErrorKind, TransportRequest};
