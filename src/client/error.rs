//! Client error types.

use std::time::Duration;

use thiserror::Error;

use crate::client::discovery::ResolveError;
use crate::load_balancer::BalancerStopped;
use crate::transport::TransportError;

/// Errors surfaced by [`Client`](crate::client::Client).
#[derive(Debug, Error)]
pub enum ClientError {
    /// A target could not be dialed. Fatal during initialization.
    #[error("dial failed: {0}")]
    Dial(#[from] TransportError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("no targets for service '{0}'")]
    NoTargets(String),

    /// The balancer task has stopped (client closed).
    #[error(transparent)]
    Stopped(#[from] BalancerStopped),

    /// No connector was handed out within the configured request timeout.
    #[error("timed out after {0:?} waiting for a connector")]
    Timeout(Duration),

    #[error("target '{0}' is already pooled")]
    DuplicateTarget(String),

    #[error("target '{0}' is not pooled")]
    UnknownTarget(String),
}
