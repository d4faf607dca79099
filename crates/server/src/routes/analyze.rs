//! `POST /analyze`
//!
//! Accepts a push envelope (`{"message": {"data": "<base64 json>"}}`) or a
//! bare `{"doc_id": ...}`. The status code is the acknowledgement: `200`
//! for success and terminal failures, `503` for retryable failures so the
//! queue redelivers.

use crate::state::ServerState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use echo::{decode_stage_message, Disposition, PipelineError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalyzeResponse {
    fn failure(doc_id: Option<String>, err: &PipelineError) -> (StatusCode, Self) {
        let status = match err.disposition() {
            Disposition::Ack => StatusCode::OK,
            Disposition::Retry => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = Self {
            ok: false,
            doc_id,
            error: Some(err.to_string()),
            ..Self::default()
        };
        (status, body)
    }
}

pub async fn analyze(State(state): State<Arc<ServerState>>, body: Bytes) -> impl IntoResponse {
    let message = match decode_stage_message(&body) {
        Ok(message) => message,
        Err(err) => {
            tracing::warn!(error = %err, "rejecting undecodable push");
            let (status, body) = AnalyzeResponse::failure(None, &err);
            return (status, Json(body));
        }
    };

    match state.resources.runner().handle_message(&message).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(AnalyzeResponse {
                ok: true,
                doc_id: Some(outcome.result.doc_id),
                topic_id: Some(outcome.result.topic_id.to_string()),
                score: Some(outcome.result.score),
                error: None,
            }),
        ),
        Err(err) => {
            let (status, body) = AnalyzeResponse::failure(Some(message.doc_id), &err);
            (status, Json(body))
        }
    }
}
