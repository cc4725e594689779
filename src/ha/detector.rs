//! Standby detection from backend responses.
//!
//! # Responsibilities
//! - Classify a buffered response as healthy or coming from a standby node
//! - Surface an explicit redirect to the active node when one is given
//!
//! # Design Decisions
//! - Status code alone is never enough; the body must carry the marker
//! - Classification is pure; it reads the buffered body and mutates nothing
//! - A malformed or relative `Location` is dropped here, never surfaced

use axum::http::StatusCode;
use std::collections::HashSet;
use std::fmt;
use url::Url;

use crate::config::HaConfig;
use crate::transport::{BackendResponse, TransportError};

/// Outcome of one physical attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureClassification {
    Healthy,
    /// Standby that named the active instance.
    StandbyRedirect { location: Url },
    /// Standby that gave no usable redirect.
    StandbyRejected,
    TransportError { cause: TransportError },
}

impl FailureClassification {
    pub fn is_healthy(&self) -> bool {
        matches!(self, FailureClassification::Healthy)
    }

    /// Short label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            FailureClassification::Healthy => "healthy",
            FailureClassification::StandbyRedirect { .. } => "standby_redirect",
            FailureClassification::StandbyRejected => "standby_rejected",
            FailureClassification::TransportError { .. } => "transport_error",
        }
    }

    pub fn into_transport_error(self) -> Option<TransportError> {
        match self {
            FailureClassification::TransportError { cause } => Some(cause),
            _ => None,
        }
    }
}

/// Decides whether a response came from a node that is not servicing requests.
pub trait FailureDetector: Send + Sync + fmt::Debug {
    fn classify(&self, response: &BackendResponse) -> FailureClassification;
}

/// Detects standby nodes by status code plus a marker string in the body.
#[derive(Debug, Clone)]
pub struct StandbyMarkerDetector {
    trigger_status_codes: HashSet<u16>,
    marker: String,
}

impl StandbyMarkerDetector {
    pub fn new(trigger_status_codes: impl IntoIterator<Item = u16>, marker: impl Into<String>) -> Self {
        Self {
            trigger_status_codes: trigger_status_codes.into_iter().collect(),
            marker: marker.into(),
        }
    }

    pub fn from_config(config: &HaConfig) -> Self {
        Self::new(
            config.trigger_status_codes.iter().copied(),
            config.standby_body_marker.clone(),
        )
    }

    fn is_trigger(&self, status: StatusCode) -> bool {
        self.trigger_status_codes.contains(&status.as_u16())
    }
}

impl FailureDetector for StandbyMarkerDetector {
    fn classify(&self, response: &BackendResponse) -> FailureClassification {
        if !self.is_trigger(response.status) {
            return FailureClassification::Healthy;
        }

        let body = String::from_utf8_lossy(&response.body);
        if body.contains(self.marker.as_str()) {
            FailureClassification::StandbyRejected
        } else {
            FailureClassification::Healthy
        }
    }
}

/// Upgrade a standby classification to a redirect when the response names a
/// parseable absolute `Location`. Other classifications pass through.
pub fn with_redirect(
    classification: FailureClassification,
    response: &BackendResponse,
) -> FailureClassification {
    if classification != FailureClassification::StandbyRejected {
        return classification;
    }

    let Some(raw) = response.location() else {
        return classification;
    };

    match Url::parse(raw) {
        Ok(location) if location.has_host() => FailureClassification::StandbyRedirect { location },
        Ok(_) => {
            tracing::debug!(location = %raw, "Ignoring redirect without host");
            classification
        }
        Err(e) => {
            tracing::debug!(location = %raw, error = %e, "Ignoring malformed redirect");
            classification
        }
    }
}
