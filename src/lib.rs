//! HA gateway library.
//!
//! A reverse proxy that fronts services running as one active node plus
//! standbys, detects standby answers, and fails requests over to the
//! active node.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http::server ──▶ routing ──▶ ha::dispatcher ──▶ transport ──▶ Backend
//!                     │                             │
//!                     │                     ha::detector / ha::selector
//!                     │                             │
//!                     ◀──────── response ───── ha::state (per-role, shared)
//!
//!     admin ──▶ ha::state (inspect / reset)
//! ```

pub mod admin;
pub mod config;
pub mod ha;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod transport;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
