//! Hyper-based transport.
//!
//! # Responsibilities
//! - Build the outbound request for one target URL
//! - Enforce the per-attempt deadline (connect + response + body)
//! - Buffer the response body up to the configured limit

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::time::Duration;
use tokio::time;
use url::Url;

use crate::http::response::strip_hop_by_hop;
use crate::transport::{BackendResponse, OutboundRequest, Transport, TransportError};

/// Transport backed by the hyper-util connection-pooling client.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Body>,
    attempt_timeout: Duration,
    max_response_bytes: usize,
}

impl HyperTransport {
    pub fn new(attempt_timeout: Duration, max_response_bytes: usize) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            attempt_timeout,
            max_response_bytes,
        }
    }

    fn build_request(
        &self,
        request: &OutboundRequest,
        target: &Url,
    ) -> Result<Request<Body>, TransportError> {
        let uri: Uri = target
            .as_str()
            .parse()
            .map_err(|e| TransportError::InvalidRequest(format!("{}: {}", target, e)))?;

        let mut builder = Request::builder().method(request.method.clone()).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in request.headers.iter() {
                // Host is set by the client from the target authority.
                if name != header::HOST {
                    headers.append(name.clone(), value.clone());
                }
            }
            strip_hop_by_hop(headers);
        }

        builder
            .body(Body::from(request.body.clone()))
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))
    }

    async fn execute(&self, req: Request<Body>, url: &str) -> Result<BackendResponse, TransportError> {
        let response = self.client.request(req).await.map_err(|e| TransportError::Connect {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(Body::new(body), self.max_response_bytes)
            .await
            .map_err(|e| TransportError::Body {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);

        Ok(BackendResponse {
            status: parts.status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(
        &self,
        request: &OutboundRequest,
        target: &Url,
    ) -> Result<BackendResponse, TransportError> {
        let req = self.build_request(request, target)?;
        let url = target.as_str();

        match time::timeout(self.attempt_timeout, self.execute(req, url)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                url: url.to_string(),
                after: self.attempt_timeout,
            }),
        }
    }
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("attempt_timeout", &self.attempt_timeout)
            .field("max_response_bytes", &self.max_response_bytes)
            .finish()
    }
}
