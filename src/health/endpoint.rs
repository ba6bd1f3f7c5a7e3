//! HTTP health endpoint.

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::health::state::HealthState;
use crate::transport::ServingStatus;

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
}

async fn health_handler(State(state): State<HealthState>) -> (StatusCode, Json<HealthBody>) {
    let status = state.status();
    let code = match status {
        ServingStatus::Serving => StatusCode::OK,
        ServingStatus::NotServing | ServingStatus::Unknown => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(HealthBody { status: status.as_str() }))
}

/// Router exposing `GET /health`.
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve the health endpoint until `shutdown` fires.
pub async fn serve_health(
    listener: TcpListener,
    state: HealthState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    tracing::info!(address = %listener.local_addr()?, "Health endpoint listening");
    axum::serve(listener, health_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}
