//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers: request id, trace, timeout)
//!     → security guards (rate limit, Basic auth / WebSocket auth)
//!     → files.rs (sandboxed workspace reads)
//!     → websocket.rs (authenticated upgrades)
//!     → Send to client
//! ```

pub mod files;
pub mod request;
pub mod server;
pub mod websocket;

pub use request::{request_id, MakeRequestUuidV4, X_REQUEST_ID};
pub use server::{AppState, GuardServer};
