//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Balancer, client, transport produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout via tracing-subscriber
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Metric updates are fire-and-forget; with no recorder installed they are no-ops
//! - Per-connector gauges are labelled by target address

pub mod logging;
pub mod metrics;
