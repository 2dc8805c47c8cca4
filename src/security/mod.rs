//! Security subsystem: the trust boundary between clients and the host.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → client_identity.rs (validated IP or anonymous fingerprint)
//!     → auth.rs (WebSocket token / Basic auth)
//!     → rate_limit.rs (fixed-window per-identity limits)
//!     → route handler
//!         → path_sandbox.rs (before touching the filesystem)
//!         → env.rs (before spawning a process)
//! ```
//!
//! # Design Decisions
//! - The guards never call each other; each is invoked per request
//! - Fail closed: a rejected check ends the request
//! - No trust in client input, including proxy headers

pub mod auth;
pub mod client_identity;
pub mod env;
pub mod path_sandbox;
pub mod rate_limit;

pub use auth::{AuthError, AuthGate, BasicCredentials, WsTokenStore};
pub use client_identity::client_identity;
pub use env::{sanitize_env_vars, sanitized_command};
pub use path_sandbox::{resolve_safe_path, validate_path_syntax, PathError, WorkspaceSandbox};
pub use rate_limit::{RateLimitDecision, RateLimitOptions, RateLimiter};
