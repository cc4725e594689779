//! Per-request dispatch context.

use std::future;
use tokio::sync::watch;
use url::Url;

use crate::ha::selector::Selection;

/// State owned by one inbound request across its attempts.
///
/// Never shared between requests, so it needs no synchronization.
#[derive(Debug, Clone)]
pub struct AttemptContext {
    attempt_count: u32,
    /// Base URL the request is currently aimed at.
    base: Url,
    /// Concrete target resolved from `base`, cleared on every failover.
    resolved: Option<Url>,
}

impl AttemptContext {
    pub fn new(base: Url) -> Self {
        Self {
            attempt_count: 0,
            base,
            resolved: None,
        }
    }

    /// Failovers recorded so far.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Count one more failed attempt and return the new total.
    pub fn record_failure(&mut self) -> u32 {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.attempt_count
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Target for the next attempt, resolving it from the base if needed.
    pub fn resolve_target(&mut self, path_and_query: &str) -> Url {
        let base = &self.base;
        self.resolved
            .get_or_insert_with(|| compose_target(base, path_and_query))
            .clone()
    }

    /// Drop the resolved target so the next attempt re-resolves it.
    pub fn invalidate(&mut self) {
        self.resolved = None;
    }

    /// Aim the request at the selector's choice.
    pub fn retarget(&mut self, selection: &Selection) {
        self.invalidate();
        match selection {
            Selection::Redirect { target, active } => {
                self.base = active.clone();
                self.resolved = Some(target.clone());
            }
            Selection::Rotation(url) => self.base = url.clone(),
        }
    }
}

/// Append a request path and query to a backend base URL, keeping the base path.
pub fn compose_target(base: &Url, path_and_query: &str) -> Url {
    let (path, query) = match path_and_query.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path_and_query, None),
    };

    let mut target = base.clone();
    let joined = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    target.set_path(&joined);
    target.set_query(query);
    target.set_fragment(None);
    target
}

/// Cooperative cancellation signal checked between attempts.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    rx: Option<watch::Receiver<bool>>,
}

impl Cancellation {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self::default()
    }

    /// Create a trigger and its paired signal.
    pub fn channel() -> (CancelTrigger, Self) {
        let (tx, rx) = watch::channel(false);
        (CancelTrigger { tx }, Self { rx: Some(rx) })
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Resolves once cancellation fires. Pends forever if the trigger is gone.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return future::pending().await;
        };

        let mut rx = rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            future::pending::<()>().await;
        }
    }
}

/// Fires a [`Cancellation`] and every clone of it.
#[derive(Debug)]
pub struct CancelTrigger {
    tx: watch::Sender<bool>,
}

impl CancelTrigger {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}
