//! Server-side trust boundary for a browser IDE host.
//!
//! Four guards sit between clients and the host's filesystem, shells and
//! upstream services:
//! - [`security::path_sandbox`]: workspace-confined path resolution
//! - [`security::rate_limit`]: fixed-window per-client throttling
//! - [`security::auth`]: one-time WebSocket tokens and Basic auth
//! - [`security::env`]: environment allowlisting for spawned processes

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::GuardConfig;
pub use http::GuardServer;
pub use lifecycle::Shutdown;
