//! Operator API over the per-role HA state.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::ha::HaProvider;

#[derive(Clone)]
pub struct AdminState {
    pub provider: Arc<HaProvider>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(provider: Arc<HaProvider>, api_key: &str) -> Self {
        Self {
            provider,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/services", get(get_services))
        .route("/admin/services/{role}/reset", post(reset_service))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;
    use url::Url;

    const KEY: &str = "s3cret";

    fn provider() -> Arc<HaProvider> {
        let provider = Arc::new(HaProvider::new());
        provider
            .register(
                "LIVYSERVER",
                vec![
                    Url::parse("http://a:8998").unwrap(),
                    Url::parse("http://b:8998").unwrap(),
                ],
            )
            .unwrap();
        provider
    }

    fn request(method: &str, uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", key));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_requires_bearer_token() {
        let app = setup_admin_router(AdminState::new(provider(), KEY));

        let response = app.clone().oneshot(request("GET", "/admin/status", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(request("GET", "/admin/status", Some("wrong")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_empty_key_rejects_everything() {
        let app = setup_admin_router(AdminState::new(provider(), ""));
        let response = app.oneshot(request("GET", "/admin/status", Some(""))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_services_and_reset() {
        let provider = provider();
        provider
            .mark_failed("LIVYSERVER", Url::parse("http://a:8998").unwrap())
            .unwrap();
        provider
            .set_active("LIVYSERVER", Url::parse("http://b:8998").unwrap())
            .unwrap();
        let app = setup_admin_router(AdminState::new(provider.clone(), KEY));

        let response = app
            .clone()
            .oneshot(request("GET", "/admin/services", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let services = json(response).await;
        assert_eq!(services[0]["role"], "LIVYSERVER");
        assert_eq!(services[0]["active"], "http://b:8998/");
        assert_eq!(services[0]["failed"][0], "http://a:8998/");

        let response = app
            .clone()
            .oneshot(request("POST", "/admin/services/LIVYSERVER/reset", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let snapshot = json(response).await;
        assert_eq!(snapshot["active"], "http://a:8998/");
        assert_eq!(snapshot["failed"].as_array().unwrap().len(), 0);
        assert_eq!(provider.active("LIVYSERVER").unwrap().as_str(), "http://a:8998/");

        let response = app
            .oneshot(request("POST", "/admin/services/NOPE/reset", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
