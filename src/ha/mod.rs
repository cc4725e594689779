//! High-availability dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request for role R
//!     → dispatcher.rs (attempt loop, per-request AttemptContext)
//!     → transport (one physical attempt against R's active URL)
//!     → detector.rs (healthy? standby? redirect?)
//!     → on failure: selector.rs under state.rs lock (redirect or rotation)
//!     → sleep, retry; deliver on success or exhaustion
//! ```
//!
//! # Design Decisions
//! - Role state is injected per role, never a global singleton
//! - Detector and selector are pluggable trait objects; per-service
//!   differences are configuration, not types
//! - Only `HaState` is shared across requests; everything else is per request

pub mod context;
pub mod detector;
pub mod dispatcher;
pub mod error;
pub mod selector;
pub mod state;

pub use context::{AttemptContext, CancelTrigger, Cancellation};
pub use detector::{FailureClassification, FailureDetector, StandbyMarkerDetector};
pub use dispatcher::{DispatchConfig, DispatchOutcome, FailoverDispatcher, Terminal};
pub use error::{DispatchError, HaError};
pub use selector::{CandidateSelector, RedirectOrRotate, Selection};
pub use state::{HaProvider, HaSnapshot, HaState};
