//! Target discovery.
//!
//! Resolution runs once, before the initial dial. Targets that appear later are
//! added through [`Client::add_target`](crate::client::Client::add_target).

use async_trait::async_trait;
use thiserror::Error;

/// Errors from a [`Resolver`].
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no targets found for service '{0}'")]
    NoTargets(String),

    #[error("failed to resolve service '{service}': {reason}")]
    Failed { service: String, reason: String },
}

/// Looks up backend addresses for a service name.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, service: &str) -> Result<Vec<String>, ResolveError>;
}

/// Resolver backed by a fixed target list, typically from config.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    targets: Vec<String>,
}

impl StaticResolver {
    pub fn new(targets: Vec<String>) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, service: &str) -> Result<Vec<String>, ResolveError> {
        if self.targets.is_empty() {
            return Err(ResolveError::NoTargets(service.to_string()));
        }
        Ok(self.targets.clone())
    }
}
