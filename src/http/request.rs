//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4) when the client sent none
//! - Propagate the request ID to the response
//! - Buffer the inbound request into a replayable `OutboundRequest`
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The body is read once, with a size limit, and replayed on every attempt

use axum::body::Body;
use axum::http::{request::Parts, HeaderMap, HeaderName, Uri};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::http::response::strip_hop_by_hop;
use crate::transport::OutboundRequest;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Layer assigning an `x-request-id` to requests that lack one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID), MakeRequestUuid)
}

/// Layer copying the request's `x-request-id` onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID))
}

/// Request ID of an inbound request, or "unknown".
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Why an inbound request could not be buffered.
#[derive(Debug)]
pub struct BodyTooLarge;

/// Buffer an inbound request for replay, forwarding `path_and_query`.
pub async fn buffer_request(
    parts: &Parts,
    body: Body,
    path_and_query: String,
    limit: usize,
) -> Result<OutboundRequest, BodyTooLarge> {
    let body = axum::body::to_bytes(body, limit).await.map_err(|_| BodyTooLarge)?;

    let mut headers = parts.headers.clone();
    strip_hop_by_hop(&mut headers);

    Ok(OutboundRequest {
        method: parts.method.clone(),
        path_and_query,
        headers,
        body,
    })
}

/// Path and query forwarded to the backend, with the route prefix removed if asked.
pub fn forwarded_path(uri: &Uri, strip: Option<&str>) -> String {
    let path = uri.path();
    let path = match strip {
        Some(prefix) => path.strip_prefix(prefix.trim_end_matches('/')).unwrap_or(path),
        None => path,
    };
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    match uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderValue, Method, Request};

    fn req(uri: &str) -> Uri {
        uri.parse().unwrap()
    }

    #[test]
    fn test_forwarded_path_without_strip() {
        assert_eq!(forwarded_path(&req("/livy/sessions?from=1"), None), "/livy/sessions?from=1");
    }

    #[test]
    fn test_forwarded_path_strips_prefix() {
        assert_eq!(forwarded_path(&req("/livy/sessions"), Some("/livy")), "/sessions");
        assert_eq!(forwarded_path(&req("/livy/sessions"), Some("/livy/")), "/sessions");
        assert_eq!(forwarded_path(&req("/livy"), Some("/livy")), "/");
        assert_eq!(forwarded_path(&req("/livy?x=1"), Some("/livy")), "/?x=1");
    }

    #[test]
    fn test_request_id_fallback() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id(&headers), "unknown");
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("req-42"));
        assert_eq!(request_id(&headers), "req-42");
    }

    #[tokio::test]
    async fn test_buffer_request() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/livy/batches")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONNECTION, "keep-alive")
            .body(Body::from(r#"{"file":"pi.py"}"#))
            .unwrap();
        let (parts, body) = request.into_parts();

        let outbound = buffer_request(&parts, body, "/batches".into(), 1024).await.unwrap();
        assert_eq!(outbound.method, Method::POST);
        assert_eq!(outbound.path_and_query, "/batches");
        assert_eq!(&outbound.body[..], br#"{"file":"pi.py"}"#);
        assert!(outbound.headers.get(header::CONNECTION).is_none());
        assert_eq!(outbound.headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
    }

    #[tokio::test]
    async fn test_buffer_request_limit() {
        let (parts, body) = Request::builder()
            .uri("/")
            .body(Body::from(vec![0u8; 2048]))
            .unwrap()
            .into_parts();
        assert!(buffer_request(&parts, body, "/".into(), 1024).await.is_err());
    }
}
