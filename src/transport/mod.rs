//! Transport collaborator.
//!
//! # Data Flow
//! ```text
//! target address
//!     → Dialer::dial (open + verify the connection)
//!     → Channel (live handle, owned by one Connector)
//!     → stub factory builds the typed client stub from &Channel
//! ```
//!
//! # Design Decisions
//! - The balancer never sees a channel; it only moves connectors around
//! - Channels must tolerate concurrent use from many borrowers
//! - Closing is idempotent and happens exactly once per connector lifetime

pub mod http;

use async_trait::async_trait;
use thiserror::Error;

pub use self::http::{HttpChannel, HttpDialer};

/// Serving status reported by a health probe.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServingStatus {
    Unknown = 0,
    Serving = 1,
    NotServing = 2,
}

impl From<u8> for ServingStatus {
    fn from(val: u8) -> Self {
        match val {
            1 => ServingStatus::Serving,
            2 => ServingStatus::NotServing,
            _ => ServingStatus::Unknown,
        }
    }
}

impl ServingStatus {
    /// Wire name used by the health endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServingStatus::Unknown => "UNKNOWN",
            ServingStatus::Serving => "SERVING",
            ServingStatus::NotServing => "NOT_SERVING",
        }
    }
}

/// Errors raised while dialing or using a channel.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Target string could not be turned into an address.
    #[error("invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    /// The TCP connection was refused or failed.
    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// Connection establishment exceeded the connect timeout.
    #[error("connect to {target} timed out after {timeout_ms} ms")]
    ConnectTimeout { target: String, timeout_ms: u64 },

    /// The channel was used after close.
    #[error("channel to {0} is closed")]
    Closed(String),

    /// A request on an established channel failed.
    #[error("request to {target} failed: {reason}")]
    Request { target: String, reason: String },
}

/// A live connection to one backend.
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    /// Address this channel is connected to.
    fn target(&self) -> &str;

    /// Probe the backend.
    async fn health_check(&self) -> ServingStatus;

    /// Release the connection. Calling it more than once is a no-op.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Opens channels to targets.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Channel: Channel;

    async fn dial(&self, target: &str) -> Result<Self::Channel, TransportError>;
}
