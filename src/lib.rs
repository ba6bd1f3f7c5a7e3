//! Client-side connection-pool load balancer.
//!
//! Dials a set of backend targets into connectors, keeps them in a min-heap
//! ordered by in-flight requests, and hands the least-loaded one to each caller.

pub mod client;
pub mod config;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod transport;

pub use client::{Client, ClientError, Lease};
pub use config::ClientConfig;
pub use lifecycle::Shutdown;
pub use load_balancer::{Connector, ConnectorId, ConnectorLoad};
pub use transport::{HttpChannel, HttpDialer, ServingStatus};
