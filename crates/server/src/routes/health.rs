use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;

/// `GET /healthz`, the probe shape push infrastructure expects.
pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

/// Health check endpoint (liveness)
/// Returns 200 if server is running
pub async fn health_check(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "echo-analyzer",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
    }))
}

/// Readiness check endpoint
/// Returns 200 once the cluster store answers within its timeout
pub async fn readiness_check(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let resources = &state.resources;
    let (status, cluster_store) = match resources.engine().topics().await {
        Ok(_) => (StatusCode::OK, "ready".to_string()),
        Err(err) => {
            tracing::warn!(error = %err, "cluster store not ready");
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
    };

    let body = json!({
        "status": if status == StatusCode::OK { "ready" } else { "not_ready" },
        "service": "echo-analyzer",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
        "components": {
            "api": "ready",
            "cluster_store": cluster_store,
            "embedding_model": resources.embedder().model_name(),
        }
    });
    (status, Json(body))
}

/// Prometheus metrics endpoint
pub async fn metrics(State(state): State<Arc<ServerState>>) -> ServerResult<String> {
    match &state.prometheus {
        Some(handle) => Ok(handle.render()),
        None => Err(ServerError::NotFound),
    }
}
