//! Pooled client integration layer.
//!
//! # Data Flow
//! ```text
//! ClientConfig
//!     → discovery.rs (resolve service → targets)
//!     → dial every target concurrently (any failure aborts)
//!     → seed pool, spawn balancer
//!
//! request()  → connector        (borrow)
//! done(c)    → completion event (return)
//! call()     → Lease            (return on drop)
//! health()   → borrow, probe, update HealthState, return
//! ```
//!
//! # Design Decisions
//! - Every successful borrow is paired with exactly one completion; `Lease`
//!   and `call_with` make the pairing automatic
//! - The client is passed explicitly to whoever needs it; no global lookup

pub mod balanced;
pub mod discovery;
pub mod error;
pub mod lease;

pub use balanced::Client;
pub use discovery::{ResolveError, Resolver, StaticResolver};
pub use error::ClientError;
pub use lease::Lease;
