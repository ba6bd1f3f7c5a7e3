//! Borrow request envelope.
//!
//! A `Request` carries the private reply channel a borrower waits on. It is a
//! one-time rendezvous: one request yields at most one connector.

use std::sync::Arc;
use tokio::sync::oneshot;

use crate::load_balancer::connector::Connector;

/// A pending borrow.
#[derive(Debug)]
pub struct Request<S> {
    reply: oneshot::Sender<Arc<Connector<S>>>,
}

impl<S> Request<S> {
    /// Create a request and the receiver its connector will arrive on.
    pub fn new() -> (Self, oneshot::Receiver<Arc<Connector<S>>>) {
        let (reply, rx) = oneshot::channel();
        (Self { reply }, rx)
    }

    /// True once the borrower has stopped waiting.
    pub fn is_cancelled(&self) -> bool {
        self.reply.is_closed()
    }

    /// Hand `connector` to the borrower.
    ///
    /// Never blocks. Gives the connector back if the borrower is gone.
    pub fn fulfil(self, connector: Arc<Connector<S>>) -> Result<(), Arc<Connector<S>>> {
        self.reply.send(connector)
    }
}
