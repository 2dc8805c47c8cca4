//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Guards and server produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout log stream
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request ID (`x-request-id`) is attached to every trace span
//! - Secrets and resolved paths never appear in client responses; rejection
//!   reasons only go to logs and metrics

pub mod logging;
pub mod metrics;
