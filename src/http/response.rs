//! Response handling and transformation.
//!
//! # Responsibilities
//! - Turn a buffered backend response into the client response
//! - Strip hop-by-hop headers on both legs
//! - Map dispatch errors to HTTP status codes
//!
//! # Design Decisions
//! - The client response is written once, from a fully buffered body
//! - A backend's own error page is passed through; the gateway only writes
//!   its own body when no backend answered at all

use axum::body::Body;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::ha::DispatchError;
use crate::transport::BackendResponse;

const HOP_BY_HOP: [header::HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove connection-scoped headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in named {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Build the client response from a backend response, verbatim.
pub fn into_client_response(backend: BackendResponse) -> Response {
    let mut response = Response::new(Body::from(backend.body));
    *response.status_mut() = backend.status;
    *response.headers_mut() = backend.headers;
    response
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = match &self {
            DispatchError::Exhausted { .. } => StatusCode::BAD_GATEWAY,
            DispatchError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::Ha(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = match &self {
            DispatchError::Exhausted { .. } => "Upstream unavailable",
            DispatchError::Cancelled { .. } => "Gateway shutting down",
            DispatchError::Ha(_) => "Service role not configured",
        };
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, X-Trace-Hop"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-trace-hop", HeaderValue::from_static("1"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/plain");
    }

    #[tokio::test]
    async fn test_into_client_response_is_verbatim() {
        let backend = BackendResponse::new(StatusCode::FORBIDDEN, "standby page")
            .with_header(header::CONTENT_TYPE, "text/html");
        let response = into_client_response(backend);

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "text/html");
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"standby page");
    }

    #[test]
    fn test_error_status_mapping() {
        let exhausted = DispatchError::Exhausted {
            role: "LIVYSERVER".into(),
            attempts: 4,
            source: None,
        };
        assert_eq!(exhausted.into_response().status(), StatusCode::BAD_GATEWAY);

        let cancelled = DispatchError::Cancelled {
            role: "LIVYSERVER".into(),
            attempts: 1,
        };
        assert_eq!(cancelled.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
