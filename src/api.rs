//! HTTP API: readiness, liveness and the policy list.
//!
//! - `GET /ready`: always `200 {}`
//! - `GET /healthz`: `503 {"error": "No Policies found"}` until at least one
//!   policy is known, then `200 {}`
//! - `GET /policies`: JSON array of known policies (only when REST is enabled)
//! - `GET /metrics`: Prometheus text format (only when metrics are enabled)

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::listeners::MetricsListener;
use crate::policy::{Policy, PolicyStore};

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    /// Policy snapshot served by the API.
    pub policies: Arc<PolicyStore>,

    /// Violation counters; `/metrics` is mounted only when set.
    pub metrics: Option<Arc<MetricsListener>>,
}

/// Build the router. `/policies` is only mounted when `rest_enabled`,
/// `/metrics` only when the state carries a [`MetricsListener`].
pub fn router(state: ApiState, rest_enabled: bool) -> Router {
    let mut router = Router::new()
        .route("/ready", get(ready))
        .route("/healthz", get(healthz));

    if rest_enabled {
        router = router.route("/policies", get(list_policies));
    }
    if state.metrics.is_some() {
        router = router.route("/metrics", get(metrics));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Serve `router` on `0.0.0.0:port` until the shutdown signal fires.
///
/// # Errors
///
/// Returns an error if the port cannot be bound or the server fails.
pub async fn serve(
    router: Router,
    port: u16,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "http server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            // A dropped sender also means shutdown.
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
        })
        .await
        .context("http server failed")
}

async fn ready() -> Json<Value> {
    Json(json!({}))
}

async fn healthz(State(state): State<ApiState>) -> (StatusCode, Json<Value>) {
    if state.policies.is_empty() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "No Policies found" })),
        )
    } else {
        (StatusCode::OK, Json(json!({})))
    }
}

async fn list_policies(State(state): State<ApiState>) -> Json<Vec<Policy>> {
    Json(state.policies.list())
}

async fn metrics(State(state): State<ApiState>) -> Response {
    let Some(metrics) = state.metrics.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match metrics.export() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!(error = %e, "failed to export metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
