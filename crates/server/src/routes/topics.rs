//! Read-only inspection of topics and results, plus the document write
//! used by the ingest stage in single-process deployments.

use super::blocking;
use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use echo::{AnalysisResult, Document};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub topic_id: String,
    pub update_count: u64,
    pub dimension: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicsResponse {
    pub total_topics: usize,
    pub max_topics: usize,
    pub topics: Vec<TopicSummary>,
}

/// `GET /api/v1/topics`: every topic in id order.
pub async fn list_topics(State(state): State<Arc<ServerState>>) -> ServerResult<impl IntoResponse> {
    let engine = state.resources.engine();
    let mut centroids = engine.topics().await?;
    centroids.sort_by_key(|c| c.topic_id);

    let topics: Vec<TopicSummary> = centroids
        .iter()
        .map(|c| TopicSummary {
            topic_id: c.topic_id.to_string(),
            update_count: c.update_count,
            dimension: c.dimension(),
        })
        .collect();

    Ok(Json(TopicsResponse {
        total_topics: topics.len(),
        max_topics: engine.config().max_topics,
        topics,
    }))
}

/// `GET /api/v1/stats`
pub async fn stats(State(state): State<Arc<ServerState>>) -> ServerResult<impl IntoResponse> {
    let total_topics = state.resources.engine().topics().await?.len();
    let documents = Arc::clone(state.resources.documents());
    let analyses = Arc::clone(state.resources.analyses());
    let (total_documents, total_analyses) = blocking(move || {
        Ok((documents.document_count()?, analyses.analysis_count()?))
    })
    .await?;

    Ok(Json(json!({
        "total_documents": total_documents,
        "total_analyses": total_analyses,
        "total_topics": total_topics,
    })))
}

/// `GET /api/v1/analyses/{doc_id}`
pub async fn get_analysis(
    State(state): State<Arc<ServerState>>,
    Path(doc_id): Path<String>,
) -> ServerResult<Json<AnalysisResult>> {
    let analyses = Arc::clone(state.resources.analyses());
    let key = doc_id.clone();
    let result = blocking(move || Ok(analyses.get_analysis(&key)?)).await?;
    result
        .map(Json)
        .ok_or(ServerError::AnalysisNotFound(doc_id))
}

/// `PUT /api/v1/documents/{doc_id}`: store a document. The path id wins over
/// any `id` in the body.
pub async fn put_document(
    State(state): State<Arc<ServerState>>,
    Path(doc_id): Path<String>,
    Json(mut document): Json<Document>,
) -> ServerResult<impl IntoResponse> {
    let doc_id = doc_id.trim().to_string();
    if doc_id.is_empty() {
        return Err(ServerError::BadRequest("doc_id must not be blank".into()));
    }
    document.id = doc_id.clone();

    let documents = Arc::clone(state.resources.documents());
    blocking(move || Ok(documents.put_document(&document)?)).await?;
    tracing::debug!(doc_id = %doc_id, "document stored");

    Ok(Json(json!({ "ok": true, "doc_id": doc_id })))
}
