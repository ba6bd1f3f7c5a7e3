//! Metrics collection and exposition.
//!
//! # Metrics
//! - `connpool_dispatch_total` (counter): connectors handed out
//! - `connpool_completion_total` (counter): completions applied
//! - `connpool_connector_pending` (gauge): in-flight requests per target
//! - `connpool_pool_size` (gauge): pooled connectors
//! - `connpool_parked_requests` (gauge): requests waiting on an empty pool
//! - `connpool_health_status` (gauge): 1=serving, 0=not serving

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::transport::ServingStatus;

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_dispatch(target: &str, pending: usize) {
    ::metrics::counter!("connpool_dispatch_total").increment(1);
    record_pending(target, pending);
}

pub fn record_completion(target: &str, pending: usize) {
    ::metrics::counter!("connpool_completion_total").increment(1);
    record_pending(target, pending);
}

fn record_pending(target: &str, pending: usize) {
    ::metrics::gauge!("connpool_connector_pending", "target" => target.to_string())
        .set(pending as f64);
}

pub fn record_pool_size(size: usize) {
    ::metrics::gauge!("connpool_pool_size").set(size as f64);
}

pub fn record_parked(parked: usize) {
    ::metrics::gauge!("connpool_parked_requests").set(parked as f64);
}

pub fn record_health_status(status: ServingStatus) {
    let value = if status == ServingStatus::Serving { 1.0 } else { 0.0 };
    ::metrics::gauge!("connpool_health_status").set(value);
}
