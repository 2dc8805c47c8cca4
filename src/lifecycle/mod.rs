//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (GuardServer::run):
//!     Build stores → Start sweeps → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received (signals.rs) → Stop accepting → Drain → Stop sweeps
//!
//! Sweeps (sweeper.rs):
//!     Interval tick → purge expired rate-limit entries / tokens
//! ```
//!
//! # Design Decisions
//! - Sweeps are explicit handles, stopped during teardown
//! - A sweep never keeps its store alive

pub mod shutdown;
pub mod signals;
pub mod sweeper;

pub use shutdown::Shutdown;
pub use sweeper::{Sweep, SweepTask};
