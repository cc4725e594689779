//! Failover dispatch loop.
//!
//! # State Machine
//! ```text
//! Attempting ──healthy──────────────▶ Succeeded
//!     │
//!     └─standby / redirect / error─▶ attempts > max? ──yes──▶ ExhaustedFailure
//!                                          │
//!                                          no
//!                                          ▼
//!                                       Retrying ──select, sleep──▶ Attempting
//! ```
//!
//! # Design Decisions
//! - One bounded loop per inbound request, no recursion
//! - The attempt counter lives in an `AttemptContext` owned by the request
//! - The role lock is taken only inside `HaState::failover`; transport calls
//!   and the inter-attempt sleep run without it
//! - On exhaustion the last backend response is delivered as-is
//! - An optional request deadline ends the loop the same way as running
//!   out of attempts

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use url::Url;

use crate::config::HaConfig;
use crate::ha::context::{AttemptContext, Cancellation};
use crate::ha::detector::{with_redirect, FailureClassification, FailureDetector};
use crate::ha::error::DispatchError;
use crate::ha::selector::{CandidateSelector, Selection};
use crate::ha::state::HaState;
use crate::observability::metrics;
use crate::transport::{BackendResponse, OutboundRequest, Transport, TransportError};

/// Retry policy for one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Failovers allowed after the first attempt.
    pub max_failover_attempts: u32,
    /// Pause between attempts.
    pub failover_delay: Duration,
}

impl DispatchConfig {
    pub fn from_ha(config: &HaConfig) -> Self {
        if !config.enabled {
            return Self {
                max_failover_attempts: 0,
                failover_delay: Duration::ZERO,
            };
        }
        Self {
            max_failover_attempts: config.max_failover_attempts,
            failover_delay: Duration::from_millis(config.failover_sleep_ms),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_failover_attempts: 3,
            failover_delay: Duration::from_millis(1000),
        }
    }
}

/// Terminal state reached by a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Succeeded,
    /// Out of attempts; the response is the last one a backend returned.
    Exhausted,
}

/// Result of a dispatch that produced a deliverable response.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub response: BackendResponse,
    pub terminal: Terminal,
    /// Physical attempts made, including the first.
    pub attempts: u32,
    /// URL that produced `response`.
    pub target: Url,
}

/// Forwards requests for one role, failing over between its candidates.
#[derive(Clone)]
pub struct FailoverDispatcher {
    state: Arc<HaState>,
    transport: Arc<dyn Transport>,
    detector: Arc<dyn FailureDetector>,
    selector: Arc<dyn CandidateSelector>,
    config: DispatchConfig,
}

impl FailoverDispatcher {
    pub fn new(
        state: Arc<HaState>,
        transport: Arc<dyn Transport>,
        detector: Arc<dyn FailureDetector>,
        selector: Arc<dyn CandidateSelector>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            state,
            transport,
            detector,
            selector,
            config,
        }
    }

    pub fn role(&self) -> &str {
        self.state.role()
    }

    pub fn state(&self) -> &Arc<HaState> {
        &self.state
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Run one inbound request to a terminal state.
    pub async fn dispatch(
        &self,
        request: &OutboundRequest,
        cancel: &Cancellation,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.dispatch_until(request, cancel, None).await
    }

    /// Like [`dispatch`](Self::dispatch), but ends as exhausted once `deadline` passes.
    ///
    /// An attempt still in flight at the deadline is abandoned; the request then
    /// gets the last backend response seen, or an upstream-unavailable error.
    pub async fn dispatch_until(
        &self,
        request: &OutboundRequest,
        cancel: &Cancellation,
        deadline: Option<Instant>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let role = self.state.role();
        let mut ctx = AttemptContext::new(self.state.active());
        let mut last_response: Option<(BackendResponse, Url)> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(DispatchError::Cancelled {
                    role: role.to_string(),
                    attempts: ctx.attempt_count(),
                });
            }

            let target = ctx.resolve_target(&request.path_and_query);
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::warn!(role = %role, attempts = ctx.attempt_count(), "Request deadline reached");
                return self.exhausted(ctx.attempt_count(), last_response, Some(deadline_error(&target)));
            }

            tracing::debug!(
                role = %role,
                target = %target,
                attempt = ctx.attempt_count().saturating_add(1),
                "Dispatching request"
            );

            let sent = match deadline {
                Some(d) => time::timeout_at(d, self.transport.send(request, &target)).await.ok(),
                None => Some(self.transport.send(request, &target).await),
            };
            let Some(sent) = sent else {
                tracing::warn!(role = %role, target = %target, "Request deadline reached during attempt");
                return self.exhausted(
                    ctx.attempt_count().saturating_add(1),
                    last_response,
                    Some(deadline_error(&target)),
                );
            };

            let classification = match sent {
                Ok(response) => {
                    let classification = self.detector.classify(&response);
                    if classification.is_healthy() {
                        return Ok(DispatchOutcome {
                            response,
                            terminal: Terminal::Succeeded,
                            attempts: ctx.attempt_count().saturating_add(1),
                            target,
                        });
                    }

                    tracing::warn!(
                        role = %role,
                        target = %target,
                        status = %response.status,
                        "Received response from standby node"
                    );
                    let classification = with_redirect(classification, &response);
                    last_response = Some((response, target.clone()));
                    classification
                }
                Err(cause) => {
                    tracing::warn!(role = %role, target = %target, error = %cause, "Error connecting to backend");
                    FailureClassification::TransportError { cause }
                }
            };

            let attempts = ctx.record_failure();
            if attempts > self.config.max_failover_attempts {
                tracing::warn!(
                    role = %role,
                    max_failover_attempts = self.config.max_failover_attempts,
                    "Maximum failover attempts reached"
                );
                return self.exhausted(attempts, last_response, classification.into_transport_error());
            }

            tracing::info!(
                role = %role,
                from = %ctx.base(),
                reason = classification.reason(),
                attempt = attempts,
                "Failing over request"
            );
            metrics::record_failover(role, classification.reason());

            ctx.invalidate();
            let selection = self
                .state
                .failover(self.selector.as_ref(), &classification, ctx.base());
            if let Selection::Redirect { target, .. } = &selection {
                tracing::info!(role = %role, location = %target, "Following failover redirect");
            }
            ctx.retarget(&selection);

            if !self.config.failover_delay.is_zero() {
                let wake = Instant::now() + self.config.failover_delay;
                let wake = deadline.map_or(wake, |d| wake.min(d));
                tokio::select! {
                    _ = time::sleep_until(wake) => {}
                    _ = cancel.cancelled() => {
                        tracing::debug!(role = %role, "Failover sleep interrupted");
                    }
                }
            }
        }
    }

    fn exhausted(
        &self,
        attempts: u32,
        last_response: Option<(BackendResponse, Url)>,
        cause: Option<TransportError>,
    ) -> Result<DispatchOutcome, DispatchError> {
        metrics::record_failover_exhausted(self.state.role());

        match last_response {
            Some((response, target)) => Ok(DispatchOutcome {
                response,
                terminal: Terminal::Exhausted,
                attempts,
                target,
            }),
            None => Err(DispatchError::Exhausted {
                role: self.state.role().to_string(),
                attempts,
                source: cause,
            }),
        }
    }
}

fn deadline_error(target: &Url) -> TransportError {
    TransportError::DeadlineExceeded {
        url: target.to_string(),
    }
}

impl std::fmt::Debug for FailoverDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverDispatcher")
            .field("role", &self.state.role())
            .field("detector", &self.detector)
            .field("selector", &self.selector)
            .field("config", &self.config)
            .finish()
    }
}
