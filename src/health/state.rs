//! Aggregate serving status shared between the client and the health endpoint.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::observability::metrics;
use crate::transport::ServingStatus;

/// Cloneable handle to the client's aggregate health.
#[derive(Debug, Clone, Default)]
pub struct HealthState {
    status: Arc<AtomicU8>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ServingStatus {
        ServingStatus::from(self.status.load(Ordering::Relaxed))
    }

    pub fn is_serving(&self) -> bool {
        self.status() == ServingStatus::Serving
    }

    /// Record a new status, returning the previous one.
    pub fn set(&self, status: ServingStatus) -> ServingStatus {
        let previous = ServingStatus::from(self.status.swap(status as u8, Ordering::Relaxed));
        if previous != status {
            tracing::info!(from = previous.as_str(), to = status.as_str(), "Health status changed");
        }
        metrics::record_health_status(status);
        previous
    }
}
