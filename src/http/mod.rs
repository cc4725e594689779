//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, buffer body, compute forwarded path)
//!     → [routing layer picks the service role]
//!     → [ha dispatcher runs the failover loop]
//!     → response.rs (strip hop-by-hop, map errors)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, BuildError, HttpServer};
