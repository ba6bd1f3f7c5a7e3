//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Init logging/metrics → Dial targets → Start balancer → Serve health
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop balancer → Close connectors → Stop health endpoint
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: any dial failure at startup is fatal
//! - Every long-running task subscribes to one broadcast

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
