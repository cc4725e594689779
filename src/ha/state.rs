//! Shared per-role cluster state.
//!
//! # Responsibilities
//! - Hold the static candidate list of a service role
//! - Track the active URL and the set of URLs marked failed
//! - Serialize every read and write through one mutex per role
//!
//! # Design Decisions
//! - Candidates are immutable after registration and read without locking
//! - The lock is held only for the selection itself, never across I/O or sleeps
//! - The active URL is always present; it starts at the first candidate
//! - The active-backend gauge is updated under the same lock as the active
//!   URL, so exactly one URL per role reads as active

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use url::Url;

use crate::ha::detector::FailureClassification;
use crate::ha::error::{HaError, HaResult};
use crate::ha::selector::{CandidateSelector, Selection};
use crate::observability::metrics;

/// Mutable part of a role's state. Only reachable while the role's lock is held.
#[derive(Debug, Clone)]
pub struct Membership {
    active: Url,
    failed: HashSet<Url>,
}

impl Membership {
    fn new(active: Url) -> Self {
        Self {
            active,
            failed: HashSet::new(),
        }
    }

    pub fn active(&self) -> &Url {
        &self.active
    }

    pub fn set_active(&mut self, url: Url) {
        self.active = url;
    }

    /// Returns true if the URL was not already marked.
    pub fn mark_failed(&mut self, url: Url) -> bool {
        self.failed.insert(url)
    }

    pub fn is_failed(&self, url: &Url) -> bool {
        self.failed.contains(url)
    }

    pub fn clear_failed(&mut self) {
        self.failed.clear();
    }

    pub fn failed(&self) -> impl Iterator<Item = &Url> {
        self.failed.iter()
    }
}

/// Point-in-time view of a role, safe to serialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HaSnapshot {
    pub role: String,
    pub candidates: Vec<String>,
    pub active: String,
    /// Sorted for stable output.
    pub failed: Vec<String>,
}

/// HA state of one service role.
#[derive(Debug)]
pub struct HaState {
    role: String,
    candidates: Vec<Url>,
    membership: Mutex<Membership>,
}

impl HaState {
    /// Create state for a role; the first candidate starts as active.
    pub fn new(role: impl Into<String>, candidates: Vec<Url>) -> HaResult<Self> {
        let role = role.into();
        let first = candidates
            .first()
            .cloned()
            .ok_or_else(|| HaError::NoCandidates(role.clone()))?;

        Ok(Self {
            role,
            candidates,
            membership: Mutex::new(Membership::new(first)),
        })
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn candidates(&self) -> &[Url] {
        &self.candidates
    }

    pub fn active(&self) -> Url {
        self.lock().active.clone()
    }

    pub fn set_active(&self, url: Url) {
        let mut membership = self.lock();
        let previous = membership.active().clone();
        membership.set_active(url);
        self.publish_active(&previous, &membership);
    }

    pub fn mark_failed(&self, url: Url) {
        self.lock().mark_failed(url);
    }

    /// Run the selector against this role under its lock.
    pub fn failover(
        &self,
        selector: &dyn CandidateSelector,
        classification: &FailureClassification,
        current: &Url,
    ) -> Selection {
        let mut membership = self.lock();
        let previous = membership.active().clone();
        let selection = selector.select(&self.candidates, &mut membership, classification, current);
        self.publish_active(&previous, &membership);
        selection
    }

    /// Forget all failures and make the first candidate active again.
    pub fn reset(&self) {
        let mut membership = self.lock();
        let previous = membership.active().clone();
        membership.clear_failed();
        // new() guarantees at least one candidate
        if let Some(first) = self.candidates.first() {
            membership.set_active(first.clone());
        }
        self.publish_active(&previous, &membership);
    }

    pub fn snapshot(&self) -> HaSnapshot {
        let membership = self.lock();
        let mut failed: Vec<String> = membership.failed().map(|u| u.to_string()).collect();
        failed.sort();

        HaSnapshot {
            role: self.role.clone(),
            candidates: self.candidates.iter().map(|u| u.to_string()).collect(),
            active: membership.active().to_string(),
            failed,
        }
    }

    /// Called with the lock held so gauge updates follow the order of changes.
    fn publish_active(&self, previous: &Url, membership: &Membership) {
        metrics::record_active_backend(&self.role, previous.as_str(), membership.active().as_str());
    }

    fn lock(&self) -> MutexGuard<'_, Membership> {
        // A poisoned lock still holds a consistent Membership.
        self.membership.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Registry of HA state keyed by service role.
#[derive(Debug, Default)]
pub struct HaProvider {
    roles: DashMap<String, Arc<HaState>>,
}

impl HaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a role with its ordered candidate list.
    pub fn register(&self, role: &str, candidates: Vec<Url>) -> HaResult<Arc<HaState>> {
        match self.roles.entry(role.to_string()) {
            Entry::Occupied(_) => Err(HaError::DuplicateRole(role.to_string())),
            Entry::Vacant(slot) => {
                let state = Arc::new(HaState::new(role, candidates)?);
                let active = state.active();
                metrics::record_active_backend(role, active.as_str(), active.as_str());
                slot.insert(state.clone());
                tracing::debug!(role = %role, active = %state.active(), "Registered HA role");
                Ok(state)
            }
        }
    }

    pub fn state(&self, role: &str) -> HaResult<Arc<HaState>> {
        self.roles
            .get(role)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| HaError::UnknownRole(role.to_string()))
    }

    pub fn candidates(&self, role: &str) -> HaResult<Vec<Url>> {
        Ok(self.state(role)?.candidates().to_vec())
    }

    pub fn mark_failed(&self, role: &str, url: Url) -> HaResult<()> {
        self.state(role)?.mark_failed(url);
        Ok(())
    }

    pub fn set_active(&self, role: &str, url: Url) -> HaResult<()> {
        self.state(role)?.set_active(url);
        Ok(())
    }

    pub fn active(&self, role: &str) -> HaResult<Url> {
        Ok(self.state(role)?.active())
    }

    pub fn reset(&self, role: &str) -> HaResult<()> {
        self.state(role)?.reset();
        Ok(())
    }

    pub fn snapshot(&self, role: &str) -> HaResult<HaSnapshot> {
        Ok(self.state(role)?.snapshot())
    }

    /// Snapshots of every role, ordered by role name.
    pub fn snapshots(&self) -> Vec<HaSnapshot> {
        let mut all: Vec<HaSnapshot> = self.roles.iter().map(|e| e.value().snapshot()).collect();
        all.sort_by(|a, b| a.role.cmp(&b.role));
        all
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(raw: &[&str]) -> Vec<Url> {
        raw.iter().map(|u| Url::parse(u).unwrap()).collect()
    }

    #[test]
    fn test_first_candidate_starts_active() {
        let state = HaState::new("LIVYSERVER", urls(&["http://a:8998", "http://b:8998"])).unwrap();
        assert_eq!(state.active(), Url::parse("http://a:8998").unwrap());
        assert!(state.snapshot().failed.is_empty());
    }

    #[test]
    fn test_empty_candidates_rejected() {
        let err = HaState::new("LIVYSERVER", Vec::new()).unwrap_err();
        assert_eq!(err, HaError::NoCandidates("LIVYSERVER".into()));
    }

    #[test]
    fn test_provider_operations() {
        let provider = HaProvider::new();
        provider.register("LIVYSERVER", urls(&["http://a", "http://b"])).unwrap();

        assert_eq!(provider.candidates("LIVYSERVER").unwrap().len(), 2);
        provider.mark_failed("LIVYSERVER", Url::parse("http://a").unwrap()).unwrap();
        provider.set_active("LIVYSERVER", Url::parse("http://b").unwrap()).unwrap();
        assert_eq!(provider.active("LIVYSERVER").unwrap().as_str(), "http://b/");

        let snap = provider.snapshot("LIVYSERVER").unwrap();
        assert_eq!(snap.failed, vec!["http://a/".to_string()]);

        provider.reset("LIVYSERVER").unwrap();
        let snap = provider.snapshot("LIVYSERVER").unwrap();
        assert!(snap.failed.is_empty());
        assert_eq!(snap.active, "http://a/");
    }

    #[test]
    fn test_unknown_and_duplicate_roles() {
        let provider = HaProvider::new();
        provider.register("WEBHDFS", urls(&["http://nn1"])).unwrap();

        assert_eq!(
            provider.register("WEBHDFS", urls(&["http://nn2"])).unwrap_err(),
            HaError::DuplicateRole("WEBHDFS".into())
        );
        assert_eq!(
            provider.active("HIVE").unwrap_err(),
            HaError::UnknownRole("HIVE".into())
        );
        // The failed registration left the existing state alone.
        assert_eq!(provider.active("WEBHDFS").unwrap().as_str(), "http://nn1/");
    }

    /// URLs whose `gateway_active_backend` gauge currently reads 1.
    fn active_gauges(rendered: &str) -> Vec<String> {
        rendered
            .lines()
            .filter(|line| line.starts_with("gateway_active_backend{"))
            .filter(|line| {
                line.rsplit(' ')
                    .next()
                    .and_then(|v| v.parse::<f64>().ok())
                    == Some(1.0)
            })
            .filter_map(|line| line.split("url=\"").nth(1))
            .filter_map(|rest| rest.split('"').next())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_active_gauge_follows_role_not_request() {
        use crate::ha::selector::RedirectOrRotate;
        use crate::transport::TransportError;
        use metrics_exporter_prometheus::PrometheusBuilder;

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        ::metrics::with_local_recorder(&recorder, || {
            let provider = HaProvider::new();
            let state = provider
                .register("LIVYSERVER", urls(&["http://a:8998", "http://b:8998", "http://c:8998"]))
                .unwrap();
            let a = Url::parse("http://a:8998").unwrap();

            // One request from A is redirected to C.
            state.failover(
                &RedirectOrRotate,
                &FailureClassification::StandbyRedirect {
                    location: Url::parse("http://c:8998/sessions").unwrap(),
                },
                &a,
            );
            // A second request that also started on A fails afterwards and rotates to B.
            state.failover(
                &RedirectOrRotate,
                &FailureClassification::TransportError {
                    cause: TransportError::Connect {
                        url: a.to_string(),
                        reason: "connection refused".into(),
                    },
                },
                &a,
            );
        });

        assert_eq!(active_gauges(&handle.render()), vec!["http://b:8998/".to_string()]);
    }

    #[test]
    fn test_reset_moves_active_gauge() {
        use metrics_exporter_prometheus::PrometheusBuilder;

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        ::metrics::with_local_recorder(&recorder, || {
            let state = HaState::new("WEBHDFS", urls(&["http://nn1", "http://nn2"])).unwrap();
            state.set_active(Url::parse("http://nn2").unwrap());
            state.reset();
        });

        assert_eq!(active_gauges(&handle.render()), vec!["http://nn1/".to_string()]);
    }

    #[test]
    fn test_snapshots_sorted_by_role() {
        let provider = HaProvider::new();
        provider.register("WEBHDFS", urls(&["http://nn1"])).unwrap();
        provider.register("HIVE", urls(&["http://hs2"])).unwrap();
        let roles: Vec<String> = provider.snapshots().into_iter().map(|s| s.role).collect();
        assert_eq!(roles, vec!["HIVE".to_string(), "WEBHDFS".to_string()]);
    }
}
