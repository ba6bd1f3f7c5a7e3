//! RAII borrow of a pooled connector.

use std::ops::Deref;
use std::sync::Arc;

use crate::load_balancer::{BalancerHandle, Connector};

/// A borrowed connector that reports completion when dropped.
///
/// Derefs to the client stub.
pub struct Lease<S> {
    connector: Arc<Connector<S>>,
    handle: BalancerHandle<S>,
}

impl<S> Lease<S> {
    pub(crate) fn new(connector: Arc<Connector<S>>, handle: BalancerHandle<S>) -> Self {
        Self { connector, handle }
    }

    pub fn connector(&self) -> &Arc<Connector<S>> {
        &self.connector
    }

    pub fn stub(&self) -> &S {
        self.connector.stub()
    }
}

impl<S> Deref for Lease<S> {
    type Target = S;
    fn deref(&self) -> &Self::Target {
        self.connector.stub()
    }
}

impl<S> Drop for Lease<S> {
    fn drop(&mut self) {
        self.handle.done(self.connector.id());
    }
}

impl<S> std::fmt::Debug for Lease<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease").field("connector", &self.connector).finish()
    }
}
