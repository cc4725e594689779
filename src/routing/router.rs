//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up matching route for request
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Routes sorted once: longest path prefix first, then host-bound
//!   routes before wildcard ones, then configuration order
//! - Explicit `None` rather than silent default

use axum::http::request::Parts;

use crate::config::ServiceConfig;
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};

/// A compiled route to one service role.
#[derive(Debug)]
pub struct Route {
    pub role: String,
    /// Normalized path prefix; empty for `/`.
    pub prefix: String,
    /// Prefix to remove before forwarding, if configured.
    pub strip_prefix: Option<String>,
    has_host: bool,
    matcher: AndMatcher,
}

impl Route {
    pub fn from_service(service: &ServiceConfig) -> Self {
        let path = PathPrefixMatcher::new(service.path_prefix.as_str());
        let prefix = path.prefix().to_string();

        let mut matchers: Vec<Box<dyn Matcher>> = vec![Box::new(path)];
        if let Some(host) = &service.host {
            matchers.push(Box::new(HostMatcher::new(host.as_str())));
        }

        Self {
            role: service.role.clone(),
            strip_prefix: service.strip_prefix.then(|| prefix.clone()),
            prefix,
            has_host: service.host.is_some(),
            matcher: AndMatcher::new(matchers),
        }
    }

    pub fn matches(&self, req: &Parts) -> bool {
        self.matcher.matches(req)
    }
}

/// Immutable route table.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn from_config(services: &[ServiceConfig]) -> Self {
        let mut routes: Vec<Route> = services.iter().map(Route::from_service).collect();
        // Stable sort keeps configuration order among equals.
        routes.sort_by(|a, b| {
            b.prefix
                .len()
                .cmp(&a.prefix.len())
                .then_with(|| b.has_host.cmp(&a.has_host))
        });
        Self { routes }
    }

    pub fn match_request(&self, req: &Parts) -> Option<&Route> {
        self.routes.iter().find(|r| r.matches(req))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
