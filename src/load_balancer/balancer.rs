//! The balancer task.
//!
//! # Responsibilities
//! - Own the pool; nothing else ever mutates it
//! - Serve borrow requests with the least-loaded connector
//! - Apply completions, membership changes and snapshot queries
//!
//! # Event Priority
//! ```text
//! shutdown > completion > control (add/remove/snapshot) > dispatch
//! ```
//! Completions drain first so dispatch decisions see the freshest load.

use std::collections::VecDeque;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::load_balancer::connector::{Connector, ConnectorId};
use crate::load_balancer::pool::{ConnectorLoad, Pool};
use crate::load_balancer::request::Request;
use crate::observability::metrics;

/// Error returned when the balancer task is gone.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("balancer is not running")]
pub struct BalancerStopped;

/// Membership and inspection events.
#[derive(Debug)]
pub enum Control<S> {
    /// Start dispatching to a newly dialed connector.
    ///
    /// Replies `false` when a connector for the same target is already pooled.
    Add {
        connector: Arc<Connector<S>>,
        reply: oneshot::Sender<bool>,
    },
    /// Withdraw the connector for `target`.
    Remove {
        target: String,
        reply: oneshot::Sender<Option<Arc<Connector<S>>>>,
    },
    /// Report per-connector load.
    Snapshot(oneshot::Sender<Vec<ConnectorLoad>>),
}

/// Single-writer owner of the connector pool.
pub struct Balancer<S> {
    pool: Pool<S>,
    requests: mpsc::Receiver<Request<S>>,
    completions: mpsc::UnboundedReceiver<ConnectorId>,
    control: mpsc::UnboundedReceiver<Control<S>>,
    /// Requests that arrived while the pool was empty, oldest first.
    parked: VecDeque<Request<S>>,
}

/// Cloneable sending side of a [`Balancer`].
pub struct BalancerHandle<S> {
    requests: mpsc::Sender<Request<S>>,
    completions: mpsc::UnboundedSender<ConnectorId>,
    control: mpsc::UnboundedSender<Control<S>>,
}

impl<S> Clone for BalancerHandle<S> {
    fn clone(&self) -> Self {
        Self {
            requests: self.requests.clone(),
            completions: self.completions.clone(),
            control: self.control.clone(),
        }
    }
}

impl<S> Balancer<S> {
    /// Create a balancer over an already seeded pool.
    ///
    /// `request_queue` bounds how many borrow requests may wait in the channel.
    pub fn new(pool: Pool<S>, request_queue: usize) -> (Self, BalancerHandle<S>) {
        let (req_tx, req_rx) = mpsc::channel(request_queue.max(1));
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (ctl_tx, ctl_rx) = mpsc::unbounded_channel();

        let balancer = Self {
            pool,
            requests: req_rx,
            completions: done_rx,
            control: ctl_rx,
            parked: VecDeque::new(),
        };
        let handle = BalancerHandle {
            requests: req_tx,
            completions: done_tx,
            control: ctl_tx,
        };
        (balancer, handle)
    }

    /// Run the event loop until shutdown or until every handle is dropped.
    ///
    /// Returns the pool so the caller can close the remaining connectors.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Pool<S> {
        tracing::info!(connectors = self.pool.len(), "Balancer starting");
        metrics::record_pool_size(self.pool.len());

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Balancer received shutdown signal, exiting loop");
                    break;
                }
                Some(id) = self.completions.recv() => self.complete(id),
                Some(event) = self.control.recv() => self.handle_control(event),
                Some(request) = self.requests.recv() => self.dispatch(request),
                else => {
                    tracing::info!("All balancer handles dropped, exiting loop");
                    break;
                }
            }
        }

        if !self.parked.is_empty() {
            tracing::warn!(parked = self.parked.len(), "Dropping parked requests on shutdown");
        }
        self.pool
    }

    /// Hand the least-loaded connector to `request`.
    fn dispatch(&mut self, request: Request<S>) {
        if request.is_cancelled() {
            tracing::trace!("Skipping cancelled request");
            return;
        }

        let Some(mut entry) = self.pool.pop_min() else {
            self.parked.push_back(request);
            tracing::debug!(parked = self.parked.len(), "Pool empty, parking request");
            metrics::record_parked(self.parked.len());
            return;
        };

        entry.pending += 1;
        let connector = Arc::clone(&entry.connector);
        metrics::record_dispatch(connector.target(), entry.pending);
        tracing::trace!(
            connector = %connector.id(),
            target = %connector.target(),
            pending = entry.pending,
            "Dispatch"
        );
        self.pool.push_entry(entry);

        if let Err(connector) = request.fulfil(connector) {
            // Borrower left between selection and hand-off.
            tracing::trace!(connector = %connector.id(), "Borrower gone, rolling back dispatch");
            self.complete(connector.id());
        }
    }

    /// Apply one completion for `id`.
    fn complete(&mut self, id: ConnectorId) {
        let Some(index) = self.pool.position_of(id) else {
            tracing::debug!(connector = %id, "Completion for connector not in pool, ignoring");
            return;
        };
        let Some(mut entry) = self.pool.remove_at(index) else {
            return;
        };

        if entry.pending == 0 {
            tracing::warn!(
                connector = %id,
                target = %entry.connector.target(),
                "Completion for idle connector, ignoring"
            );
        } else {
            entry.pending -= 1;
        }

        metrics::record_completion(entry.connector.target(), entry.pending);
        tracing::trace!(connector = %id, pending = entry.pending, "Completion");
        self.pool.push_entry(entry);
    }

    fn handle_control(&mut self, event: Control<S>) {
        match event {
            Control::Add { connector, reply } => {
                let added = self.add(connector);
                let _ = reply.send(added);
            }
            Control::Remove { target, reply } => {
                let removed = self
                    .pool
                    .position_of_target(&target)
                    .and_then(|index| self.pool.remove_at(index));
                match &removed {
                    Some(entry) => tracing::info!(
                        target = %target,
                        pending = entry.pending,
                        remaining = self.pool.len(),
                        "Connector removed from pool"
                    ),
                    None => tracing::debug!(target = %target, "Remove for unknown target"),
                }
                metrics::record_pool_size(self.pool.len());
                let _ = reply.send(removed.map(|entry| entry.connector));
            }
            Control::Snapshot(reply) => {
                let _ = reply.send(self.pool.snapshot());
            }
        }
    }

    fn add(&mut self, connector: Arc<Connector<S>>) -> bool {
        let id = connector.id();
        let target = connector.target().to_string();
        if self.pool.position_of_target(&target).is_some() {
            tracing::debug!(connector = %id, target = %target, "Target already pooled, rejecting");
            return false;
        }
        if !self.pool.push(connector) {
            tracing::debug!(connector = %id, "Connector already pooled");
            return false;
        }
        tracing::info!(
            connector = %id,
            target = %target,
            size = self.pool.len(),
            "Connector added to pool"
        );
        metrics::record_pool_size(self.pool.len());

        let parked = std::mem::take(&mut self.parked);
        for request in parked {
            self.dispatch(request);
        }
        metrics::record_parked(self.parked.len());
        true
    }
}

impl<S: Send + Sync + 'static> Balancer<S> {
    /// Run the balancer on its own task.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<Pool<S>> {
        tokio::spawn(self.run(shutdown))
    }
}

impl<S> BalancerHandle<S> {
    /// Borrow the least-loaded connector.
    ///
    /// Waits while the pool is empty. Every successful call must be paired
    /// with exactly one [`done`](Self::done).
    ///
    /// Dropping the returned future after the balancer already handed over a
    /// connector gives that connector back.
    pub async fn request(&self) -> Result<Arc<Connector<S>>, BalancerStopped> {
        let (request, rx) = Request::new();
        let mut handoff = Handoff {
            rx,
            completions: &self.completions,
            settled: false,
        };
        self.requests.send(request).await.map_err(|_| BalancerStopped)?;
        let result = (&mut handoff.rx).await;
        handoff.settled = true;
        result.map_err(|_| BalancerStopped)
    }

    /// Report that one unit of work on `id` finished. Never blocks.
    pub fn done(&self, id: ConnectorId) {
        if self.completions.send(id).is_err() {
            tracing::trace!(connector = %id, "Completion after balancer stopped");
        }
    }

    /// Insert `connector` into the pool.
    ///
    /// Resolves to `false` when its target is already pooled; the caller still
    /// owns the rejected connector and should close it.
    pub async fn add(&self, connector: Arc<Connector<S>>) -> Result<bool, BalancerStopped> {
        let (reply, rx) = oneshot::channel();
        self.control
            .send(Control::Add { connector, reply })
            .map_err(|_| BalancerStopped)?;
        rx.await.map_err(|_| BalancerStopped)
    }

    pub async fn remove(
        &self,
        target: &str,
    ) -> Result<Option<Arc<Connector<S>>>, BalancerStopped> {
        let (reply, rx) = oneshot::channel();
        self.control
            .send(Control::Remove {
                target: target.to_string(),
                reply,
            })
            .map_err(|_| BalancerStopped)?;
        rx.await.map_err(|_| BalancerStopped)
    }

    pub async fn snapshot(&self) -> Result<Vec<ConnectorLoad>, BalancerStopped> {
        let (reply, rx) = oneshot::channel();
        self.control
            .send(Control::Snapshot(reply))
            .map_err(|_| BalancerStopped)?;
        rx.await.map_err(|_| BalancerStopped)
    }
}

/// Reply side of an in-flight borrow.
///
/// If the borrower goes away after the connector was sent but before it was
/// read, the connector is returned through the completion channel.
struct Handoff<'a, S> {
    rx: oneshot::Receiver<Arc<Connector<S>>>,
    completions: &'a mpsc::UnboundedSender<ConnectorId>,
    settled: bool,
}

impl<S> Drop for Handoff<'_, S> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        // After close() the balancer can no longer deliver, so whatever is
        // buffered now is the only connector this borrow could own.
        self.rx.close();
        if let Ok(connector) = self.rx.try_recv() {
            tracing::trace!(connector = %connector.id(), "Borrower dropped after hand-off");
            let _ = self.completions.send(connector.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;
    use crate::load_balancer::connector::testing::connector;
    use crate::load_balancer::pool::Entry;
    use std::time::Duration;

    type Started = (BalancerHandle<String>, Shutdown, JoinHandle<Pool<String>>);

    fn start(loads: &[usize]) -> Started {
        let mut pool = Pool::new();
        for (i, &pending) in loads.iter().enumerate() {
            pool.push_entry(Entry {
                connector: connector(&format!("10.0.0.{}:80", i)),
                pending,
            });
        }
        let shutdown = Shutdown::new();
        let (balancer, handle) = Balancer::new(pool, 16);
        let task = balancer.spawn(shutdown.subscribe());
        (handle, shutdown, task)
    }

    fn sorted(mut loads: Vec<ConnectorLoad>) -> Vec<(String, usize)> {
        loads.sort_by(|a, b| a.target.cmp(&b.target));
        loads.into_iter().map(|l| (l.target, l.pending)).collect()
    }

    fn pending_of(loads: &[ConnectorLoad], id: ConnectorId) -> usize {
        loads.iter().find(|l| l.id == id).map(|l| l.pending).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_picks_least_loaded() {
        let (handle, _shutdown, _task) = start(&[0, 3, 1, 0]);

        let chosen = handle.request().await.unwrap();
        assert!(chosen.target() == "10.0.0.0:80" || chosen.target() == "10.0.0.3:80");

        let loads = handle.snapshot().await.unwrap();
        assert_eq!(pending_of(&loads, chosen.id()), 1);

        // The other idle connector is next.
        let second = handle.request().await.unwrap();
        assert_ne!(second.id(), chosen.id());
        assert!(second.target() == "10.0.0.0:80" || second.target() == "10.0.0.3:80");
    }

    #[tokio::test]
    async fn test_dispatch_conserves_load() {
        let (handle, _shutdown, _task) = start(&[2, 0, 5]);
        let before: usize = handle.snapshot().await.unwrap().iter().map(|l| l.pending).sum();

        for _ in 0..25 {
            handle.request().await.unwrap();
        }

        let after: usize = handle.snapshot().await.unwrap().iter().map(|l| l.pending).sum();
        assert_eq!(after, before + 25);
    }

    #[tokio::test]
    async fn test_dispatch_then_done_restores_state() {
        let (handle, _shutdown, _task) = start(&[1, 0, 2, 0, 4]);
        let before = sorted(handle.snapshot().await.unwrap());

        let connector = handle.request().await.unwrap();
        handle.done(connector.id());

        let after = sorted(handle.snapshot().await.unwrap());
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_done_on_idle_connector_clamps_at_zero() {
        let (handle, _shutdown, _task) = start(&[0, 0]);
        let connector = handle.request().await.unwrap();
        handle.done(connector.id());
        handle.done(connector.id());
        handle.done(connector.id());

        let loads = handle.snapshot().await.unwrap();
        assert_eq!(pending_of(&loads, connector.id()), 0);
    }

    #[tokio::test]
    async fn test_empty_pool_parks_until_add() {
        let (handle, _shutdown, _task) = start(&[]);

        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.request().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        let added = connector("late:80");
        assert!(handle.add(added.clone()).await.unwrap());

        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(got.id(), added.id());
        assert_eq!(pending_of(&handle.snapshot().await.unwrap(), added.id()), 1);
    }

    #[tokio::test]
    async fn test_cancelled_parked_request_does_not_leak() {
        let (handle, _shutdown, _task) = start(&[]);

        let result = tokio::time::timeout(Duration::from_millis(50), handle.request()).await;
        assert!(result.is_err());

        let added = connector("late:80");
        assert!(handle.add(added.clone()).await.unwrap());
        assert_eq!(pending_of(&handle.snapshot().await.unwrap(), added.id()), 0);
    }

    #[tokio::test]
    async fn test_borrow_dropped_after_handoff_returns_connector() {
        let (handle, _shutdown, _task) = start(&[0]);

        let mut borrow = Box::pin(handle.request());
        assert!(futures_util::poll!(borrow.as_mut()).is_pending());

        // Let the balancer deliver before the borrower goes away.
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(borrow);

        let loads = handle.snapshot().await.unwrap();
        assert_eq!(loads[0].pending, 0);
    }

    #[tokio::test]
    async fn test_add_rejects_pooled_target() {
        let (handle, _shutdown, _task) = start(&[2]);

        let twin = connector("10.0.0.0:80");
        assert!(!handle.add(twin.clone()).await.unwrap());

        let fresh = connector("10.0.0.9:80");
        assert!(handle.add(fresh.clone()).await.unwrap());
        assert!(!handle.add(fresh).await.unwrap());

        let loads = sorted(handle.snapshot().await.unwrap());
        assert_eq!(
            loads,
            vec![("10.0.0.0:80".to_string(), 2), ("10.0.0.9:80".to_string(), 0)]
        );
    }

    #[tokio::test]
    async fn test_remove_withdraws_connector() {
        let (handle, _shutdown, _task) = start(&[0, 0]);
        let borrowed = handle.request().await.unwrap();
        let target = borrowed.target().to_string();

        let removed = handle.remove(&target).await.unwrap().unwrap();
        assert_eq!(removed.id(), borrowed.id());
        assert!(handle.remove(&target).await.unwrap().is_none());

        // Late completion for the removed connector is ignored.
        handle.done(borrowed.id());
        let loads = handle.snapshot().await.unwrap();
        assert_eq!(loads.len(), 1);
        assert_eq!(loads[0].pending, 0);

        for _ in 0..3 {
            assert_ne!(handle.request().await.unwrap().target(), target);
        }
    }

    #[tokio::test]
    async fn test_shutdown_returns_pool() {
        let (handle, shutdown, task) = start(&[0, 1, 2]);
        handle.request().await.unwrap();

        shutdown.trigger();
        let pool = task.await.unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.total_pending(), 4);

        assert_eq!(handle.request().await.unwrap_err(), BalancerStopped);
    }

    #[tokio::test]
    async fn test_interleaved_dispatch_never_skips_less_loaded() {
        let (handle, _shutdown, _task) = start(&[3, 0, 5, 1]);
        let mut rng = fastrand::Rng::with_seed(0xba1a);
        let mut held: Vec<Arc<Connector<String>>> = Vec::new();

        for _ in 0..500 {
            let connector = handle.request().await.unwrap();
            let loads = handle.snapshot().await.unwrap();
            let chosen = pending_of(&loads, connector.id());
            for other in loads.iter().filter(|l| l.id != connector.id()) {
                assert!(
                    chosen - 1 <= other.pending,
                    "picked {} at {} over {} at {}",
                    connector.target(),
                    chosen - 1,
                    other.target,
                    other.pending
                );
            }

            if rng.bool() {
                handle.done(connector.id());
            } else {
                held.push(connector);
            }
            if !held.is_empty() && rng.u8(..4) == 0 {
                let returned = held.swap_remove(rng.usize(..held.len()));
                handle.done(returned.id());
            }
        }

        for connector in held {
            handle.done(connector.id());
        }
        let total: usize = handle.snapshot().await.unwrap().iter().map(|l| l.pending).sum();
        assert_eq!(total, 9);
    }

    #[tokio::test]
    async fn test_concurrent_dispatch_stays_balanced() {
        let (handle, _shutdown, _task) = start(&[0, 0]);

        let mut tasks = Vec::new();
        for _ in 0..100 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move { handle.request().await.unwrap() }));
        }
        let mut borrowed = Vec::new();
        for task in tasks {
            borrowed.push(task.await.unwrap());
        }

        let loads = handle.snapshot().await.unwrap();
        assert_eq!(loads.iter().map(|l| l.pending).sum::<usize>(), 100);
        assert!(loads.iter().all(|l| l.pending == 50));

        for connector in borrowed {
            handle.done(connector.id());
        }
        let loads = handle.snapshot().await.unwrap();
        assert!(loads.iter().all(|l| l.pending == 0));
    }
}
