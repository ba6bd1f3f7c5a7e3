//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, queue > 0)
//! - Reject duplicate or empty targets
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::ClientConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check `config` and collect every problem found.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.service.name.trim().is_empty() {
        errors.push(ValidationError::new("service.name", "must not be empty"));
    }

    if config.service.targets.is_empty() {
        errors.push(ValidationError::new("service.targets", "at least one target is required"));
    }
    let mut seen = HashSet::new();
    for target in &config.service.targets {
        if target.trim().is_empty() {
            errors.push(ValidationError::new("service.targets", "target must not be empty"));
        } else if !seen.insert(target.as_str()) {
            errors.push(ValidationError::new(
                "service.targets",
                format!("duplicate target '{}'", target),
            ));
        }
    }

    if config.transport.connect_timeout_ms == 0 {
        errors.push(ValidationError::new("transport.connect_timeout_ms", "must be greater than 0"));
    }
    if config.transport.health_timeout_ms == 0 {
        errors.push(ValidationError::new("transport.health_timeout_ms", "must be greater than 0"));
    }
    if !config.transport.health_path.starts_with('/') {
        errors.push(ValidationError::new("transport.health_path", "must start with '/'"));
    }

    if config.balancer.request_queue == 0 {
        errors.push(ValidationError::new("balancer.request_queue", "must be greater than 0"));
    }
    if config.balancer.request_timeout_ms == Some(0) {
        errors.push(ValidationError::new(
            "balancer.request_timeout_ms",
            "must be greater than 0 when set",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address '{}'", config.observability.metrics_address),
        ));
    }
    if config.health_endpoint.enabled
        && config.health_endpoint.bind_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "health_endpoint.bind_address",
            format!("invalid socket address '{}'", config.health_endpoint.bind_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
