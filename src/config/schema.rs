//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for a pooled client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend service and its static target list.
    pub service: ServiceConfig,

    /// Dial and health probe settings.
    pub transport: TransportConfig,

    /// Balancer queue and per-call timeout.
    pub balancer: BalancerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Health endpoint served by the binary.
    pub health_endpoint: HealthEndpointConfig,
}

/// Backend service definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Logical service name, used for target resolution and logging.
    pub name: String,

    /// Backend addresses (e.g., "127.0.0.1:50051").
    pub targets: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            targets: Vec::new(),
        }
    }
}

/// Transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Connection establishment timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Path probed by health checks.
    pub health_path: String,

    /// Health probe timeout in milliseconds.
    pub health_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            health_path: "/health".to_string(),
            health_timeout_ms: 2_000,
        }
    }
}

/// Balancer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// Capacity of the inbound request channel.
    pub request_queue: usize,

    /// Optional bound on how long a borrow may wait, in milliseconds.
    pub request_timeout_ms: Option<u64>,
}

impl BalancerConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            request_queue: 1024,
            request_timeout_ms: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Health endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthEndpointConfig {
    pub enabled: bool,

    pub bind_address: String,
}

impl Default for HealthEndpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8086".to_string(),
        }
    }
}
