//! Connector abstraction.
//!
//! # Responsibilities
//! - Own one live backend channel and the typed stub derived from it
//! - Expose the stub for concurrent use by borrowers
//! - Probe and close the channel

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::transport::{Channel, Dialer, ServingStatus, TransportError};

/// Process-wide counter for connector IDs.
static CONNECTOR_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectorId(u64);

impl ConnectorId {
    /// Generate a new unique connector ID.
    pub fn new() -> Self {
        Self(CONNECTOR_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "connector-{}", self.0)
    }
}

/// A pooled handle to one backend channel plus its client stub.
///
/// Load accounting (pending count, heap position) lives in the pool, not here,
/// so a `Connector` can be shared freely between the balancer and borrowers.
pub struct Connector<S> {
    id: ConnectorId,
    target: String,
    channel: Box<dyn Channel>,
    stub: S,
    closed: AtomicBool,
}

impl<S> Connector<S> {
    /// Dial `target` and build the stub with `register`.
    ///
    /// `register` sees the concrete channel type, so the stub type is fixed here
    /// and callers never downcast.
    pub async fn dial<D, F>(dialer: &D, target: &str, register: F) -> Result<Self, TransportError>
    where
        D: Dialer,
        F: FnOnce(&D::Channel) -> S,
    {
        let channel = dialer.dial(target).await?;
        let stub = register(&channel);
        Ok(Self::from_parts(target, channel, stub))
    }

    /// Assemble a connector from an already established channel.
    pub fn from_parts<C: Channel>(target: &str, channel: C, stub: S) -> Self {
        Self {
            id: ConnectorId::new(),
            target: target.to_string(),
            channel: Box::new(channel),
            stub,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ConnectorId {
        self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// The typed stub. Safe to use from many borrowers at once.
    pub fn stub(&self) -> &S {
        &self.stub
    }

    /// Probe the backend behind this connector.
    pub async fn health_check(&self) -> ServingStatus {
        if self.is_closed() {
            return ServingStatus::NotServing;
        }
        self.channel.health_check().await
    }

    /// Release the channel. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.channel.close();
        tracing::debug!(connector = %self.id, target = %self.target, "Connector closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<S> std::fmt::Debug for Connector<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("closed", &self.is_closed())
            .finish()
    }
}
