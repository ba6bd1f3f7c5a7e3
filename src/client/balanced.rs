//! The load-balanced client.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{join_all, BoxFuture};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;

use crate::client::discovery::{Resolver, StaticResolver};
use crate::client::error::ClientError;
use crate::client::lease::Lease;
use crate::config::ClientConfig;
use crate::health::HealthState;
use crate::lifecycle::Shutdown;
use crate::load_balancer::{
    Balancer, BalancerHandle, BalancerStopped, Connector, ConnectorLoad, Pool,
};
use crate::transport::{Dialer, ServingStatus, TransportError};

type DialFuture<S> = BoxFuture<'static, Result<Connector<S>, TransportError>>;
type DialFn<S> = Arc<dyn Fn(String) -> DialFuture<S> + Send + Sync>;

/// Client that spreads calls over a pool of connectors, least-loaded first.
pub struct Client<S> {
    service: String,
    handle: BalancerHandle<S>,
    dial: DialFn<S>,
    health: HealthState,
    request_timeout: Option<Duration>,
    shutdown: Shutdown,
    task: Mutex<Option<JoinHandle<Pool<S>>>>,
}

impl<S: Send + Sync + 'static> Client<S> {
    /// Dial the configured targets and start balancing.
    ///
    /// `register` turns each dialed channel into the stub borrowers call.
    pub async fn connect<D, F>(
        config: &ClientConfig,
        dialer: D,
        register: F,
    ) -> Result<Self, ClientError>
    where
        D: Dialer,
        F: Fn(&D::Channel) -> S + Send + Sync + 'static,
    {
        let resolver = StaticResolver::new(config.service.targets.clone());
        Self::connect_with_resolver(config, &resolver, dialer, register).await
    }

    /// Like [`connect`](Self::connect) but with targets from `resolver`.
    pub async fn connect_with_resolver<R, D, F>(
        config: &ClientConfig,
        resolver: &R,
        dialer: D,
        register: F,
    ) -> Result<Self, ClientError>
    where
        R: Resolver + ?Sized,
        D: Dialer,
        F: Fn(&D::Channel) -> S + Send + Sync + 'static,
    {
        let service = config.service.name.clone();
        let targets = resolver.resolve(&service).await?;
        if targets.is_empty() {
            return Err(ClientError::NoTargets(service));
        }

        let dialer = Arc::new(dialer);
        let register = Arc::new(register);
        let dial: DialFn<S> = Arc::new(move |target: String| -> DialFuture<S> {
            let dialer = Arc::clone(&dialer);
            let register = Arc::clone(&register);
            Box::pin(async move {
                Connector::dial(&*dialer, &target, |channel: &D::Channel| register(channel)).await
            })
        });

        let connectors = Self::init_connectors(&dial, &targets).await?;

        let mut pool = Pool::new();
        for connector in connectors {
            pool.push(Arc::new(connector));
        }

        let shutdown = Shutdown::new();
        let (balancer, handle) = Balancer::new(pool, config.balancer.request_queue);
        let task = balancer.spawn(shutdown.subscribe());

        tracing::info!(service = %service, connectors = targets.len(), "Client connected");

        Ok(Self {
            service,
            handle,
            dial,
            health: HealthState::new(),
            request_timeout: config.balancer.request_timeout(),
            shutdown,
            task: Mutex::new(Some(task)),
        })
    }

    /// Dial every target. Any failure closes what did connect and aborts.
    async fn init_connectors(
        dial: &DialFn<S>,
        targets: &[String],
    ) -> Result<Vec<Connector<S>>, ClientError> {
        let results = join_all(targets.iter().map(|target| dial(target.clone()))).await;

        let mut connectors = Vec::with_capacity(results.len());
        let mut failure = None;
        for result in results {
            match result {
                Ok(connector) => connectors.push(connector),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to dial target");
                    failure.get_or_insert(e);
                }
            }
        }

        if let Some(e) = failure {
            for connector in &connectors {
                connector.close();
            }
            return Err(ClientError::Dial(e));
        }
        Ok(connectors)
    }
}

impl<S> Client<S> {
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Borrow the least-loaded connector.
    ///
    /// Must be paired with exactly one [`done`](Self::done); prefer
    /// [`call`](Self::call) which pairs automatically.
    pub async fn request(&self) -> Result<Arc<Connector<S>>, ClientError> {
        match self.request_timeout {
            Some(limit) => time::timeout(limit, self.handle.request())
                .await
                .map_err(|_| ClientError::Timeout(limit))?
                .map_err(ClientError::from),
            None => Ok(self.handle.request().await?),
        }
    }

    /// Return a connector obtained from [`request`](Self::request).
    pub fn done(&self, connector: &Connector<S>) {
        self.handle.done(connector.id());
    }

    /// Borrow a connector for the lifetime of the returned lease.
    pub async fn call(&self) -> Result<Lease<S>, ClientError> {
        let connector = self.request().await?;
        Ok(Lease::new(connector, self.handle.clone()))
    }

    /// Borrow a connector, run `f` with it, and return it whatever `f` yields.
    pub async fn call_with<F, Fut, T>(&self, f: F) -> Result<T, ClientError>
    where
        F: FnOnce(Arc<Connector<S>>) -> Fut,
        Fut: Future<Output = T>,
    {
        let lease = self.call().await?;
        Ok(f(Arc::clone(lease.connector())).await)
    }

    /// Probe one borrowed connector and record the result as the aggregate status.
    pub async fn health(&self) -> Result<ServingStatus, ClientError> {
        let lease = self.call().await?;
        let status = lease.connector().health_check().await;
        if status != ServingStatus::Serving {
            tracing::warn!(
                target = %lease.connector().target(),
                status = status.as_str(),
                "Connector not serving"
            );
        }
        self.health.set(status);
        Ok(status)
    }

    /// Shared health status for the health endpoint.
    pub fn health_status(&self) -> HealthState {
        self.health.clone()
    }

    /// Dial `target` and start dispatching to it.
    pub async fn add_target(&self, target: &str) -> Result<(), ClientError> {
        if self.shutdown.is_triggered() {
            return Err(ClientError::Stopped(BalancerStopped));
        }
        if self.loads().await?.iter().any(|l| l.target == target) {
            return Err(ClientError::DuplicateTarget(target.to_string()));
        }

        let connector = Arc::new((self.dial)(target.to_string()).await?);
        match self.handle.add(Arc::clone(&connector)).await {
            Ok(true) => Ok(()),
            // A concurrent add for the same target won the race.
            Ok(false) => {
                connector.close();
                Err(ClientError::DuplicateTarget(target.to_string()))
            }
            Err(stopped) => {
                connector.close();
                Err(ClientError::Stopped(stopped))
            }
        }
    }

    /// Withdraw `target` from the pool and close its connector.
    ///
    /// Borrowers still holding it keep a usable reference until they return it.
    pub async fn remove_target(&self, target: &str) -> Result<(), ClientError> {
        match self.handle.remove(target).await? {
            Some(connector) => {
                connector.close();
                Ok(())
            }
            None => Err(ClientError::UnknownTarget(target.to_string())),
        }
    }

    /// Per-connector pending counts.
    pub async fn loads(&self) -> Result<Vec<ConnectorLoad>, ClientError> {
        Ok(self.handle.snapshot().await?)
    }

    /// Stop the balancer and close every pooled connector. Idempotent.
    pub async fn close(&self) {
        if !self.shutdown.trigger() {
            return;
        }
        let Some(task) = self.task.lock().await.take() else {
            return;
        };
        match task.await {
            Ok(pool) => {
                let connectors = pool.into_connectors();
                for connector in &connectors {
                    connector.close();
                }
                tracing::info!(service = %self.service, closed = connectors.len(), "Client closed");
            }
            Err(e) => tracing::error!(error = %e, "Balancer task failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::discovery::ResolveError;
    use crate::load_balancer::connector::testing::{MockChannel, MockDialer};
    use std::sync::atomic::Ordering;

    fn config(targets: &[&str]) -> ClientConfig {
        let mut config = ClientConfig::default();
        config.service.name = "echo".into();
        config.service.targets = targets.iter().map(|t| t.to_string()).collect();
        config
    }

    type Stub = MockChannel;

    async fn connect(targets: &[&str]) -> Client<Stub> {
        Client::connect(&config(targets), MockDialer::default(), |ch: &MockChannel| ch.clone())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_seeds_pool() {
        let client = connect(&["a:1", "b:2", "c:3"]).await;
        let loads = client.loads().await.unwrap();
        assert_eq!(loads.len(), 3);
        assert!(loads.iter().all(|l| l.pending == 0));
        assert_eq!(client.service(), "echo");
    }

    #[tokio::test]
    async fn test_dial_failure_aborts_connect() {
        let result = Client::connect(
            &config(&["a:1", "down:2", "c:3"]),
            MockDialer::refusing(&["down:2"]),
            |ch: &MockChannel| ch.clone(),
        )
        .await;
        assert!(matches!(result, Err(ClientError::Dial(TransportError::Connect { .. }))));
    }

    #[tokio::test]
    async fn test_resolver_failure() {
        struct Broken;

        #[async_trait::async_trait]
        impl Resolver for Broken {
            async fn resolve(&self, service: &str) -> Result<Vec<String>, ResolveError> {
                Err(ResolveError::Failed {
                    service: service.to_string(),
                    reason: "registry down".into(),
                })
            }
        }

        let result = Client::connect_with_resolver(
            &config(&[]),
            &Broken,
            MockDialer::default(),
            |ch: &MockChannel| ch.clone(),
        )
        .await;
        assert!(matches!(result, Err(ClientError::Resolve(_))));
    }

    #[tokio::test]
    async fn test_request_done_pairing() {
        let client = connect(&["a:1", "b:2"]).await;

        let first = client.request().await.unwrap();
        let second = client.request().await.unwrap();
        assert_ne!(first.id(), second.id());

        client.done(&first);
        client.done(&second);
        assert!(client.loads().await.unwrap().iter().all(|l| l.pending == 0));
    }

    #[tokio::test]
    async fn test_lease_returns_on_drop() {
        let client = connect(&["a:1"]).await;
        {
            let lease = client.call().await.unwrap();
            assert_eq!(lease.target, "a:1");
            assert_eq!(client.loads().await.unwrap()[0].pending, 1);
        }
        assert_eq!(client.loads().await.unwrap()[0].pending, 0);
    }

    #[tokio::test]
    async fn test_call_with_returns_on_error() {
        let client = connect(&["a:1"]).await;
        let result: Result<(), &str> = client
            .call_with(|connector| async move {
                assert_eq!(connector.target(), "a:1");
                Err("rpc failed")
            })
            .await
            .unwrap();
        assert!(result.is_err());
        assert_eq!(client.loads().await.unwrap()[0].pending, 0);
    }

    #[tokio::test]
    async fn test_health_updates_aggregate_status() {
        let client = connect(&["a:1"]).await;
        let status = client.health_status();

        assert_eq!(client.health().await.unwrap(), ServingStatus::Serving);
        assert!(status.is_serving());

        let stub = client.call().await.unwrap().stub().clone();
        stub.healthy.store(false, Ordering::SeqCst);

        assert_eq!(client.health().await.unwrap(), ServingStatus::NotServing);
        assert_eq!(status.status(), ServingStatus::NotServing);

        // Unhealthy connectors stay pooled and the borrow was returned.
        let loads = client.loads().await.unwrap();
        assert_eq!(loads.len(), 1);
        assert_eq!(loads[0].pending, 0);
    }

    #[tokio::test]
    async fn test_request_timeout_on_empty_pool() {
        let mut config = config(&["a:1"]);
        config.balancer.request_timeout_ms = Some(50);
        let client = Client::connect(&config, MockDialer::default(), |ch: &MockChannel| ch.clone())
            .await
            .unwrap();

        client.remove_target("a:1").await.unwrap();
        let err = client.request().await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout(d) if d == Duration::from_millis(50)));

        client.add_target("b:2").await.unwrap();
        let connector = client.request().await.unwrap();
        assert_eq!(connector.target(), "b:2");
        client.done(&connector);

        let loads = client.loads().await.unwrap();
        assert_eq!(loads.len(), 1);
        assert_eq!(loads[0].pending, 0);
    }

    #[tokio::test]
    async fn test_add_and_remove_targets() {
        let client = connect(&["a:1"]).await;

        client.add_target("b:2").await.unwrap();
        assert!(matches!(client.add_target("b:2").await, Err(ClientError::DuplicateTarget(_))));
        assert_eq!(client.loads().await.unwrap().len(), 2);

        let held = client.request().await.unwrap();
        client.remove_target(held.target()).await.unwrap();
        assert!(held.is_closed());
        client.done(&held);

        assert!(matches!(
            client.remove_target("zzz:9").await,
            Err(ClientError::UnknownTarget(_))
        ));
        assert_eq!(client.loads().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_add_of_same_target_pools_once() {
        let client = connect(&["a:1"]).await;

        let (first, second) = tokio::join!(client.add_target("b:2"), client.add_target("b:2"));
        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(ClientError::DuplicateTarget(t)) if t == "b:2")));

        let loads = client.loads().await.unwrap();
        assert_eq!(loads.iter().filter(|l| l.target == "b:2").count(), 1);

        client.remove_target("b:2").await.unwrap();
        let loads = client.loads().await.unwrap();
        assert!(loads.iter().all(|l| l.target != "b:2"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_closes_connectors() {
        let client = connect(&["a:1", "b:2"]).await;
        let stub = client.call().await.unwrap().stub().clone();

        client.close().await;
        client.close().await;

        assert!(stub.closed.load(Ordering::SeqCst));
        assert!(matches!(client.request().await, Err(ClientError::Stopped(_))));
        assert!(matches!(client.add_target("c:3").await, Err(ClientError::Stopped(_))));
    }
}
