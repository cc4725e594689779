//! Backend transport subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request (buffered once)
//!     → OutboundRequest (method, path, headers, body bytes)
//!     → Transport::send(request, target URL)   ← repeated per attempt
//!     → BackendResponse (status, headers, fully buffered body)
//! ```
//!
//! # Design Decisions
//! - Bodies are buffered on both legs so a request can be replayed against
//!   another backend and a failed attempt never leaks bytes to the client
//! - The transport knows nothing about HA; it executes exactly one attempt
//! - Failures are typed so the dispatcher can tell them apart in logs

pub mod client;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub use client::HyperTransport;

/// Errors produced by a single physical attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection could not be established or was reset.
    #[error("connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    /// The attempt did not complete within the per-attempt deadline.
    #[error("request to {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    /// The whole request ran out of time while this attempt was in flight.
    #[error("request deadline passed while waiting on {url}")]
    DeadlineExceeded { url: String },

    /// Response body could not be read or exceeded the size limit.
    #[error("failed to read response body from {url}: {reason}")]
    Body { url: String, reason: String },

    /// The outbound request could not be built for the target.
    #[error("invalid outbound request: {0}")]
    InvalidRequest(String),
}

/// A fully buffered request that can be replayed against any backend.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    /// Path and query forwarded to the backend (prefix already stripped).
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OutboundRequest {
    pub fn new(method: Method, path_and_query: impl Into<String>) -> Self {
        Self {
            method,
            path_and_query: path_and_query.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Path component without the query string.
    pub fn path(&self) -> &str {
        self.path_and_query
            .split_once('?')
            .map(|(path, _)| path)
            .unwrap_or(&self.path_and_query)
    }
}

/// A backend response with its body fully read into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BackendResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Add a header, ignoring values that are not valid header text.
    pub fn with_header(mut self, name: header::HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Raw `Location` header, if present and valid text.
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }
}

/// Executes one HTTP attempt against one backend URL.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(
        &self,
        request: &OutboundRequest,
        target: &Url,
    ) -> Result<BackendResponse, TransportError>;
}
