//! Client-side load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Client dials targets
//!     → connector.rs (channel + typed stub)
//!     → pool.rs (min-heap keyed by pending count)
//!     → balancer.rs (single task owning the pool)
//!
//! Borrower:
//!     request.rs envelope → balancer request channel
//!         → pop least-loaded, pending += 1, push back
//!         → connector returned over the private reply channel
//!     RPC on connector.stub()
//!     ConnectorId → balancer completion channel
//!         → remove by position, pending -= 1, push back
//! ```
//!
//! # Design Decisions
//! - One policy: fewest in-flight requests wins
//! - Pool is mutated only inside the balancer task; no locks
//! - Pending counts live in the pool, not on shared connectors
//! - Empty pool parks requests until a connector is added

pub mod balancer;
pub mod connector;
pub mod pool;
pub mod request;

pub use balancer::{Balancer, BalancerHandle, BalancerStopped, Control};
pub use connector::{Connector, ConnectorId};
pub use pool::{ConnectorLoad, Entry, Pool};
pub use request::Request;
