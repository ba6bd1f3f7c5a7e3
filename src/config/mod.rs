//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → consumed once at Client construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; pool membership changes go through the
//!   client API, not config reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::BalancerConfig;
pub use schema::ClientConfig;
pub use schema::HealthEndpointConfig;
pub use schema::ObservabilityConfig;
pub use schema::ServiceConfig;
pub use schema::TransportConfig;
