//! Health reporting subsystem.
//!
//! # Data Flow
//! ```text
//! Client::health()
//!     → borrow connector → Connector::health_check()
//!     → state.rs (aggregate serving status)
//!     → endpoint.rs (GET /health → 200 / 503)
//! ```
//!
//! # Design Decisions
//! - Aggregate status reflects the last probed connector
//! - Unhealthy connectors stay in the pool; only the status degrades
//! - State is a shared handle, passed explicitly to whoever serves it

pub mod endpoint;
pub mod state;

pub use endpoint::{health_router, serve_health};
pub use state::HealthState;
