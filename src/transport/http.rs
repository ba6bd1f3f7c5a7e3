//! HTTP channel over hyper-util's client.
//!
//! # Responsibilities
//! - Resolve and eagerly connect to a target so unreachable backends fail at dial
//! - Provide a concurrent request handle bound to one backend
//! - Probe `health_path` for liveness

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response, Uri};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpStream;
use tokio::time;
use url::Url;

use crate::config::TransportConfig;
use crate::transport::{Channel, Dialer, ServingStatus, TransportError};

/// Dials [`HttpChannel`]s.
#[derive(Debug, Clone)]
pub struct HttpDialer {
    connect_timeout: Duration,
    health_path: String,
    health_timeout: Duration,
}

impl HttpDialer {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            health_path: config.health_path.clone(),
            health_timeout: Duration::from_millis(config.health_timeout_ms),
        }
    }
}

impl Default for HttpDialer {
    fn default() -> Self {
        Self::new(&TransportConfig::default())
    }
}

/// Parse `host:port` or a full `http://` URL into a base URL.
pub fn parse_target(target: &str) -> Result<Url, TransportError> {
    let raw = if target.contains("://") {
        target.to_string()
    } else {
        format!("http://{}", target)
    };

    let url = Url::parse(&raw).map_err(|e| TransportError::InvalidTarget {
        target: target.to_string(),
        reason: e.to_string(),
    })?;

    if url.scheme() != "http" {
        return Err(TransportError::InvalidTarget {
            target: target.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    if url.host_str().is_none() {
        return Err(TransportError::InvalidTarget {
            target: target.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(url)
}

#[async_trait]
impl Dialer for HttpDialer {
    type Channel = HttpChannel;

    async fn dial(&self, target: &str) -> Result<HttpChannel, TransportError> {
        let base = parse_target(target)?;
        let host = base.host_str().unwrap_or_default().to_string();
        let port = base.port_or_known_default().unwrap_or(80);

        // Fail here rather than on the first borrowed call.
        match time::timeout(self.connect_timeout, TcpStream::connect((host.as_str(), port))).await {
            Ok(Ok(_probe)) => {}
            Ok(Err(source)) => {
                return Err(TransportError::Connect {
                    target: target.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(TransportError::ConnectTimeout {
                    target: target.to_string(),
                    timeout_ms: self.connect_timeout.as_millis() as u64,
                })
            }
        }

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(self.connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        tracing::debug!(target = %target, base = %base, "HTTP channel established");

        Ok(HttpChannel {
            target: target.to_string(),
            base,
            client,
            health_path: self.health_path.clone(),
            health_timeout: self.health_timeout,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// Request handle bound to a single backend.
///
/// Cloning is cheap and clones share the closed flag, so a stub holding a clone
/// stops working once the owning connector is closed.
#[derive(Clone)]
pub struct HttpChannel {
    target: String,
    base: Url,
    client: Client<HttpConnector, Body>,
    health_path: String,
    health_timeout: Duration,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for HttpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChannel")
            .field("target", &self.target)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl HttpChannel {
    /// Base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn uri(&self, path: &str) -> Result<Uri, TransportError> {
        let url = self.base.join(path).map_err(|e| TransportError::Request {
            target: self.target.clone(),
            reason: format!("invalid path '{}': {}", path, e),
        })?;
        url.as_str().parse().map_err(|e: axum::http::uri::InvalidUri| TransportError::Request {
            target: self.target.clone(),
            reason: e.to_string(),
        })
    }

    /// Send a request with `method` to `path` on this backend.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Body,
    ) -> Result<Response<Body>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed(self.target.clone()));
        }

        let request = Request::builder()
            .method(method)
            .uri(self.uri(path)?)
            .header("user-agent", "connpool")
            .body(body)
            .map_err(|e| TransportError::Request {
                target: self.target.clone(),
                reason: e.to_string(),
            })?;

        let response: Response<Incoming> = self
            .client
            .request(request)
            .await
            .map_err(|e| TransportError::Request {
                target: self.target.clone(),
                reason: e.to_string(),
            })?;

        Ok(response.map(Body::new))
    }

    pub async fn get(&self, path: &str) -> Result<Response<Body>, TransportError> {
        self.request(Method::GET, path, Body::empty()).await
    }
}

#[async_trait]
impl Channel for HttpChannel {
    fn target(&self) -> &str {
        &self.target
    }

    async fn health_check(&self) -> ServingStatus {
        match time::timeout(self.health_timeout, self.get(&self.health_path)).await {
            Ok(Ok(response)) => {
                if response.status().is_success() {
                    ServingStatus::Serving
                } else {
                    tracing::warn!(
                        target = %self.target,
                        status = %response.status(),
                        "Health check failed: non-success status"
                    );
                    ServingStatus::NotServing
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    target = %self.target,
                    error = %e,
                    "Health check failed: request error"
                );
                ServingStatus::NotServing
            }
            Err(_) => {
                tracing::warn!(target = %self.target, "Health check failed: timeout");
                ServingStatus::NotServing
            }
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(target = %self.target, "HTTP channel closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
