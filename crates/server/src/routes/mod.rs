//! API route handlers
//!
//! - `analyze`: the push endpoint driving the stage
//! - `health`: liveness, readiness and Prometheus metrics
//! - `topics`: read-only inspection plus the document write used by ingest

pub mod analyze;
pub mod health;
pub mod topics;

use crate::error::{ServerError, ServerResult};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// Service info (`GET /`).
pub async fn api_info() -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({
        "service": "analyzer",
        "ok": true,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/analyze",
            "/healthz",
            "/health",
            "/ready",
            "/metrics",
            "/api/v1/topics",
            "/api/v1/stats",
            "/api/v1/analyses/{doc_id}",
            "/api/v1/documents/{doc_id}"
        ]
    })))
}

/// 404 Not Found handler
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}

/// Run a synchronous store call off the async workers.
pub(crate) async fn blocking<T, F>(op: F) -> ServerResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ServerResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(op).await?
}
