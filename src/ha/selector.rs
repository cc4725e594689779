//! Failover target selection.
//!
//! # Responsibilities
//! - Follow a standby's redirect to the node it names as active
//! - Otherwise rotate through the candidate list, skipping failed URLs
//!
//! # Design Decisions
//! - Runs with the role's lock held (see `HaState::failover`)
//! - Redirect targets are adopted eagerly as active, before the retry
//!   confirms them, so concurrent requests converge on the same node
//! - When every candidate is marked failed the failed set is cleared and
//!   rotation restarts at the first candidate

use std::fmt;
use url::Url;

use crate::ha::detector::FailureClassification;
use crate::ha::state::Membership;

/// Where the next attempt goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Retry exactly `target`; `active` is the base URL adopted for the role.
    Redirect { target: Url, active: Url },
    /// Retry the next candidate base URL.
    Rotation(Url),
}

impl Selection {
    /// Base URL now active for the role.
    pub fn active(&self) -> &Url {
        match self {
            Selection::Redirect { active, .. } => active,
            Selection::Rotation(url) => url,
        }
    }
}

/// Computes the next URL after a failed attempt and records it in the role state.
pub trait CandidateSelector: Send + Sync + fmt::Debug {
    fn select(
        &self,
        candidates: &[Url],
        membership: &mut Membership,
        classification: &FailureClassification,
        current: &Url,
    ) -> Selection;
}

/// Redirect if the backend named one, otherwise round-robin over healthy candidates.
#[derive(Debug, Default, Clone, Copy)]
pub struct RedirectOrRotate;

impl RedirectOrRotate {
    pub fn new() -> Self {
        Self
    }
}

impl CandidateSelector for RedirectOrRotate {
    fn select(
        &self,
        candidates: &[Url],
        membership: &mut Membership,
        classification: &FailureClassification,
        current: &Url,
    ) -> Selection {
        if let FailureClassification::StandbyRedirect { location } = classification {
            let active = redirect_base(candidates, location);
            membership.set_active(active.clone());
            return Selection::Redirect {
                target: location.clone(),
                active,
            };
        }

        membership.mark_failed(current.clone());
        let next = next_candidate(candidates, membership, current);
        membership.set_active(next.clone());
        Selection::Rotation(next)
    }
}

/// Next non-failed candidate after `current`, wrapping around.
fn next_candidate(candidates: &[Url], membership: &mut Membership, current: &Url) -> Url {
    let Some(first) = candidates.first() else {
        return current.clone();
    };

    if candidates.iter().all(|c| membership.is_failed(c)) {
        tracing::debug!(count = candidates.len(), "All candidates failed, resetting rotation");
        membership.clear_failed();
        return first.clone();
    }

    // A redirect-discovered URL is not in the list; start from the top.
    let start = candidates
        .iter()
        .position(|c| c == current)
        .map(|i| i + 1)
        .unwrap_or(0);

    (0..candidates.len())
        .map(|i| &candidates[(start + i) % candidates.len()])
        .find(|c| !membership.is_failed(c))
        .unwrap_or(first)
        .clone()
}

/// Base URL to adopt as active for a redirect location.
///
/// A candidate with the same origin keeps its configured base path;
/// otherwise the location's origin is used.
fn redirect_base(candidates: &[Url], location: &Url) -> Url {
    if let Some(candidate) = candidates.iter().find(|c| c.origin() == location.origin()) {
        return candidate.clone();
    }

    let mut base = location.clone();
    base.set_path("/");
    base.set_query(None);
    base.set_fragment(None);
    base
}
