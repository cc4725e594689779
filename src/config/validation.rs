//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check candidate URLs are absolute plain-http URLs
//! - Validate value ranges (timeouts > 0, status codes valid)
//! - Check the request timeout covers every service's failover budget
//! - Detect duplicate roles and duplicate candidates
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use url::Url;

use crate::config::schema::{GatewayConfig, ServiceConfig};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    NoServices,
    DuplicateRole(String),
    InvalidPathPrefix { role: String, prefix: String },
    NoCandidates(String),
    InvalidUrl { role: String, url: String, reason: String },
    DuplicateUrl { role: String, url: String },
    InvalidStatusCode { role: String, code: u16 },
    EmptyStandbyMarker(String),
    ZeroValue(&'static str),
    MissingAdminKey,
    RequestTimeoutTooShort { role: String, required_ms: u64, request_secs: u64 },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NoServices => write!(f, "no services configured"),
            ValidationError::DuplicateRole(role) => write!(f, "duplicate service role '{}'", role),
            ValidationError::InvalidPathPrefix { role, prefix } => {
                write!(f, "service '{}': path_prefix '{}' must start with '/'", role, prefix)
            }
            ValidationError::NoCandidates(role) => write!(f, "service '{}' has no urls", role),
            ValidationError::InvalidUrl { role, url, reason } => {
                write!(f, "service '{}': invalid url '{}': {}", role, url, reason)
            }
            ValidationError::DuplicateUrl { role, url } => {
                write!(f, "service '{}': url '{}' listed twice", role, url)
            }
            ValidationError::InvalidStatusCode { role, code } => {
                write!(f, "service '{}': invalid trigger status code {}", role, code)
            }
            ValidationError::EmptyStandbyMarker(role) => {
                write!(f, "service '{}': standby_body_marker must not be empty", role)
            }
            ValidationError::ZeroValue(field) => write!(f, "{} must be greater than zero", field),
            ValidationError::RequestTimeoutTooShort { role, required_ms, request_secs } => write!(
                f,
                "service '{}': timeouts.request_secs ({}s) is shorter than its failover budget ({}ms)",
                role, request_secs, required_ms
            ),
            ValidationError::MissingAdminKey => {
                write!(f, "admin.api_key is required when the admin API is enabled")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.services.is_empty() {
        errors.push(ValidationError::NoServices);
    }

    let mut roles = HashSet::new();
    for service in &config.services {
        let role = &service.role;
        if !roles.insert(role.as_str()) {
            errors.push(ValidationError::DuplicateRole(role.clone()));
        }

        if !service.path_prefix.starts_with('/') {
            errors.push(ValidationError::InvalidPathPrefix {
                role: role.clone(),
                prefix: service.path_prefix.clone(),
            });
        }

        if service.urls.is_empty() {
            errors.push(ValidationError::NoCandidates(role.clone()));
        }

        let mut seen = HashSet::new();
        for raw in &service.urls {
            match Url::parse(raw) {
                Ok(url) if url.scheme() != "http" => {
                    errors.push(ValidationError::InvalidUrl {
                        role: role.clone(),
                        url: raw.clone(),
                        reason: format!("unsupported scheme '{}'", url.scheme()),
                    });
                }
                Ok(url) => {
                    if !seen.insert(url) {
                        errors.push(ValidationError::DuplicateUrl {
                            role: role.clone(),
                            url: raw.clone(),
                        });
                    }
                }
                Err(e) => errors.push(ValidationError::InvalidUrl {
                    role: role.clone(),
                    url: raw.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        for &code in &service.ha.trigger_status_codes {
            if !(100..=599).contains(&code) {
                errors.push(ValidationError::InvalidStatusCode { role: role.clone(), code });
            }
        }

        if service.ha.enabled && service.ha.standby_body_marker.is_empty() {
            errors.push(ValidationError::EmptyStandbyMarker(role.clone()));
        }

        let required_ms = failover_budget_ms(service, config.timeouts.attempt_secs);
        if config.timeouts.request_secs.saturating_mul(1000) < required_ms {
            errors.push(ValidationError::RequestTimeoutTooShort {
                role: role.clone(),
                required_ms,
                request_secs: config.timeouts.request_secs,
            });
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroValue("timeouts.request_secs"));
    }
    if config.timeouts.attempt_secs == 0 {
        errors.push(ValidationError::ZeroValue("timeouts.attempt_secs"));
    }
    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroValue("limits.max_body_bytes"));
    }
    if config.limits.max_response_bytes == 0 {
        errors.push(ValidationError::ZeroValue("limits.max_response_bytes"));
    }
    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::MissingAdminKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Worst case for one request: every attempt runs to its timeout, with a
/// failover sleep between consecutive attempts.
fn failover_budget_ms(service: &ServiceConfig, attempt_secs: u64) -> u64 {
    let (failovers, sleep_ms) = if service.ha.enabled {
        (u64::from(service.ha.max_failover_attempts), service.ha.failover_sleep_ms)
    } else {
        (0, 0)
    };

    (failovers + 1)
        .saturating_mul(attempt_secs.saturating_mul(1000))
        .saturating_add(failovers.saturating_mul(sleep_ms))
}
