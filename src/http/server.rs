//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the gateway handler
//! - Wire up middleware (tracing, request ID)
//! - Build one failover dispatcher per configured service role
//! - Dispatch matched requests and write the terminal response
//! - Fire dispatch cancellation on shutdown
//! - Bound each request by `timeouts.request_secs`, ending in the dispatcher's
//!   exhausted result rather than a bare timeout

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};
use tower_http::trace::TraceLayer;
use url::Url;

use crate::config::{GatewayConfig, LimitsConfig};
use crate::ha::{
    CancelTrigger, Cancellation, DispatchConfig, FailoverDispatcher, HaError, HaProvider,
    RedirectOrRotate, StandbyMarkerDetector, Terminal,
};
use crate::http::request::{
    buffer_request, forwarded_path, propagate_request_id_layer, request_id, set_request_id_layer,
};
use crate::http::response::into_client_response;
use crate::observability::metrics;
use crate::routing::Router as GatewayRouter;
use crate::transport::{HyperTransport, Transport};

/// Errors building the server from configuration.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("service '{role}' has invalid url '{url}': {source}")]
    InvalidUrl {
        role: String,
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    Ha(#[from] HaError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<GatewayRouter>,
    pub dispatchers: Arc<HashMap<String, FailoverDispatcher>>,
    pub cancel: Cancellation,
    pub limits: LimitsConfig,
    pub request_timeout: Duration,
}

/// HTTP server for the HA gateway.
pub struct HttpServer {
    router: Router,
    provider: Arc<HaProvider>,
    cancel_trigger: CancelTrigger,
}

impl HttpServer {
    /// Create a server forwarding over plain HTTP.
    pub fn new(config: &GatewayConfig) -> Result<Self, BuildError> {
        let transport = HyperTransport::new(
            Duration::from_secs(config.timeouts.attempt_secs),
            config.limits.max_response_bytes,
        );
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a server forwarding through the given transport.
    pub fn with_transport(
        config: &GatewayConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, BuildError> {
        let provider = Arc::new(HaProvider::new());
        let selector = Arc::new(RedirectOrRotate::new());
        let mut dispatchers = HashMap::with_capacity(config.services.len());

        for service in &config.services {
            let candidates = service
                .urls
                .iter()
                .map(|raw| {
                    Url::parse(raw).map_err(|source| BuildError::InvalidUrl {
                        role: service.role.clone(),
                        url: raw.clone(),
                        source,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let state = provider.register(&service.role, candidates)?;
            let dispatch_config = DispatchConfig::from_ha(&service.ha);
            tracing::info!(
                role = %service.role,
                path_prefix = %service.path_prefix,
                candidates = state.candidates().len(),
                active = %state.active(),
                max_failover_attempts = dispatch_config.max_failover_attempts,
                "Service registered"
            );

            let dispatcher = FailoverDispatcher::new(
                state,
                transport.clone(),
                Arc::new(StandbyMarkerDetector::from_config(&service.ha)),
                selector.clone(),
                dispatch_config,
            );
            dispatchers.insert(service.role.clone(), dispatcher);
        }

        let (cancel_trigger, cancel) = Cancellation::channel();
        let state = AppState {
            router: Arc::new(GatewayRouter::from_config(&config.services)),
            dispatchers: Arc::new(dispatchers),
            cancel,
            limits: config.limits.clone(),
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
        };

        let router = Self::build_router(state);
        Ok(Self {
            router,
            provider,
            cancel_trigger,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Per-role HA state, shared with the admin API.
    pub fn provider(&self) -> Arc<HaProvider> {
        self.provider.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let trigger = self.cancel_trigger;
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, cancelling failover loops");
                trigger.cancel();
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main gateway handler.
/// Looks up the route, buffers the request and runs it through the role's dispatcher.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = std::time::Instant::now();
    let deadline = Instant::now() + state.request_timeout;
    let (parts, body) = request.into_parts();
    let request_id = request_id(&parts.headers);
    let method = parts.method.to_string();

    let Some(route) = state.router.match_request(&parts) else {
        tracing::warn!(request_id = %request_id, path = %parts.uri.path(), "No route matched");
        metrics::record_request(&method, 404, "none", start_time);
        return (StatusCode::NOT_FOUND, "No matching route found").into_response();
    };
    let role = route.role.as_str();

    let Some(dispatcher) = state.dispatchers.get(role) else {
        tracing::error!(request_id = %request_id, role = %role, "Route has no dispatcher");
        metrics::record_request(&method, 500, role, start_time);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Service role not configured").into_response();
    };

    let path_and_query = forwarded_path(&parts.uri, route.strip_prefix.as_deref());
    let buffered = time::timeout_at(
        deadline,
        buffer_request(&parts, body, path_and_query, state.limits.max_body_bytes),
    )
    .await;
    let outbound = match buffered {
        Ok(Ok(outbound)) => outbound,
        Ok(Err(_)) => {
            tracing::warn!(request_id = %request_id, role = %role, "Request body too large");
            metrics::record_request(&method, 413, role, start_time);
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
        Err(_) => {
            tracing::warn!(request_id = %request_id, role = %role, "Timed out reading request body");
            metrics::record_request(&method, 408, role, start_time);
            return (StatusCode::REQUEST_TIMEOUT, "Request body not received in time").into_response();
        }
    };

    tracing::debug!(
        request_id = %request_id,
        role = %role,
        method = %method,
        path = %outbound.path_and_query,
        "Proxying request"
    );

    match dispatcher
        .dispatch_until(&outbound, &state.cancel, Some(deadline))
        .await
    {
        Ok(outcome) => {
            let status = outcome.response.status.as_u16();
            if outcome.terminal == Terminal::Exhausted {
                tracing::warn!(
                    request_id = %request_id,
                    role = %role,
                    target = %outcome.target,
                    status,
                    attempts = outcome.attempts,
                    "Delivering last standby response after failover exhausted"
                );
            }
            metrics::record_request(&method, status, role, start_time);
            into_client_response(outcome.response)
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, role = %role, error = %e, "Dispatch failed");
            let response = e.into_response();
            metrics::record_request(&method, response.status().as_u16(), role, start_time);
            response
        }
    }
}
