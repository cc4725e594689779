//! HA error types.

use thiserror::Error;

use crate::transport::TransportError;

/// Errors raised by the HA state registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HaError {
    #[error("unknown service role '{0}'")]
    UnknownRole(String),

    #[error("service role '{0}' is already registered")]
    DuplicateRole(String),

    #[error("service role '{0}' has no candidate urls")]
    NoCandidates(String),
}

/// Caller-visible dispatch failures.
///
/// Everything below the failover ceiling is recovered inside the dispatcher;
/// only these reach the client.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Attempts ran out and no backend ever produced a response.
    #[error("upstream unavailable for role '{role}' after {attempts} attempt(s)")]
    Exhausted {
        role: String,
        attempts: u32,
        #[source]
        source: Option<TransportError>,
    },

    /// The retry loop was abandoned before reaching a terminal state.
    #[error("dispatch for role '{role}' cancelled after {attempts} failed attempt(s)")]
    Cancelled { role: String, attempts: u32 },

    #[error(transparent)]
    Ha(#[from] HaError),
}

pub type HaResult<T> = Result<T, HaError>;
