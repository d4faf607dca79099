//! Echo analyzer stage.
//!
//! The pipeline ingests documents from a feed, assigns each one to a topic,
//! summarizes and reports. This crate is the analyzer in the middle: for one
//! `{doc_id}` message it loads the document, embeds `title + body_text`,
//! clusters the embedding with [`cluster::ClusteringEngine`], stores the
//! [`AnalysisResult`] and publishes `{doc_id}` to the next stage.
//!
//! Delivery is at-least-once. Every failure is classified as retryable
//! (leave the message unacknowledged) or terminal (acknowledge and log), see
//! [`PipelineError::disposition`].

pub mod config;
pub mod queue;
pub mod resources;
pub mod stage;
pub mod store;
pub mod types;

pub use cluster::{
    Assignment, AssignmentKind, Centroid, ClusterConfig, ClusterError, ClusterStore,
    ClusteringEngine, InMemoryClusterStore, TopicId,
};
pub use embed::{EmbedConfig, EmbedError, Embedding, EmbeddingProvider};

pub use crate::config::{ConfigLoadError, EchoConfig};
pub use crate::queue::{
    HttpPublisher, InMemoryQueue, MessagePublisher, PublishError, PushEnvelope, TOPIC_ANALYZED,
    TOPIC_INGEST, TOPIC_SUMMARIZED, decode_stage_message,
};
pub use crate::resources::{PipelineResources, ResourceError};
pub use crate::stage::{StageOutcome, StageRunner, StageSettings};
#[cfg(feature = "embedded")]
pub use crate::store::RedbStore;
pub use crate::store::{AnalysisStore, DocumentStore, InMemoryStore, StorageConfig, StoreError};
pub use crate::types::{AnalysisResult, Document, StageMessage};

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Where a document is in the stage when it succeeds or fails.
///
/// `Received -> Embedding -> Clustering -> Persisted -> Forwarded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Received,
    Embedding,
    Clustering,
    Persisted,
    Forwarded,
}

impl StageState {
    pub fn as_str(self) -> &'static str {
        match self {
            StageState::Received => "received",
            StageState::Embedding => "embedding",
            StageState::Clustering => "clustering",
            StageState::Persisted => "persisted",
            StageState::Forwarded => "forwarded",
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the transport should do with the inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Done with this message, successfully or not.
    Ack,
    /// Leave unacknowledged so the queue redelivers it.
    Retry,
}

/// Errors that can occur while processing one document through the stage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// The document does not exist. Terminal: redelivery cannot fix it.
    #[error("document not found: {doc_id}")]
    NotFound { doc_id: String },

    /// Title and body are both blank.
    #[error("document {doc_id} has no text to embed")]
    EmptyDocument { doc_id: String },

    /// The inbound message could not be decoded.
    #[error("invalid stage message: {0}")]
    InvalidMessage(String),

    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The provider returned a vector the clustering stage cannot use.
    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),

    #[error("store unavailable while {state}: {message}")]
    StoreUnavailable { state: StageState, message: String },

    /// Every clustering attempt lost a race. Terminal after the in-process
    /// attempt budget.
    #[error("clustering contention after {attempts} attempts")]
    ClusteringContention { attempts: u32 },

    /// The cluster layer rejected the work for a reason redelivery cannot fix.
    #[error("clustering failed: {0}")]
    ClusteringFailed(String),

    /// The result is persisted but the continuation was not published.
    #[error("forwarding to '{topic}' failed: {message}")]
    ForwardFailed { topic: String, message: String },
}

impl PipelineError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::EmbeddingUnavailable(_)
                | PipelineError::StoreUnavailable { .. }
                | PipelineError::ForwardFailed { .. }
        )
    }

    pub fn disposition(&self) -> Disposition {
        if self.is_retryable() {
            Disposition::Retry
        } else {
            Disposition::Ack
        }
    }

    /// Last state the document reached before the failure.
    pub fn state(&self) -> StageState {
        match self {
            PipelineError::NotFound { .. } | PipelineError::InvalidMessage(_) => {
                StageState::Received
            }
            PipelineError::EmptyDocument { .. } | PipelineError::EmbeddingUnavailable(_) => {
                StageState::Embedding
            }
            PipelineError::InvalidEmbedding(_)
            | PipelineError::ClusteringContention { .. }
            | PipelineError::ClusteringFailed(_) => StageState::Clustering,
            PipelineError::StoreUnavailable { state, .. } => *state,
            PipelineError::ForwardFailed { .. } => StageState::Persisted,
        }
    }

    /// Stable machine-readable code for responses and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::NotFound { .. } => "not_found",
            PipelineError::EmptyDocument { .. } => "empty_document",
            PipelineError::InvalidMessage(_) => "invalid_message",
            PipelineError::EmbeddingUnavailable(_) => "embedding_unavailable",
            PipelineError::InvalidEmbedding(_) => "invalid_embedding",
            PipelineError::StoreUnavailable { .. } => "store_unavailable",
            PipelineError::ClusteringContention { .. } => "clustering_contention",
            PipelineError::ClusteringFailed(_) => "clustering_failed",
            PipelineError::ForwardFailed { .. } => "forward_failed",
        }
    }
}

impl From<ClusterError> for PipelineError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::Contention { attempts } => PipelineError::ClusteringContention { attempts },
            ClusterError::DimensionMismatch { .. } | ClusterError::InvalidEmbedding(_) => {
                PipelineError::InvalidEmbedding(err.to_string())
            }
            other if other.is_retryable() => PipelineError::StoreUnavailable {
                state: StageState::Clustering,
                message: other.to_string(),
            },
            other => PipelineError::ClusteringFailed(other.to_string()),
        }
    }
}

/// Metrics observer for pipeline stages.
pub trait PipelineMetrics: Send + Sync {
    fn record_embedding(&self, latency: Duration, result: Result<(), PipelineError>);
    fn record_clustering(&self, latency: Duration, result: Result<AssignmentKind, PipelineError>);
    fn record_forward(&self, latency: Duration, result: Result<(), PipelineError>);
}

/// Install or clear the global pipeline metrics recorder.
pub fn set_pipeline_metrics(recorder: Option<Arc<dyn PipelineMetrics>>) {
    let mut guard = metrics_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn PipelineMetrics>>> {
    static METRICS: OnceLock<RwLock<Option<Arc<dyn PipelineMetrics>>>> = OnceLock::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

fn metrics_recorder() -> Option<Arc<dyn PipelineMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}

pub(crate) struct MetricsSpan {
    recorder: Arc<dyn PipelineMetrics>,
    start: Instant,
}

impl MetricsSpan {
    pub(crate) fn start() -> Option<Self> {
        metrics_recorder().map(|recorder| Self {
            recorder,
            start: Instant::now(),
        })
    }

    pub(crate) fn record_embedding(self, result: Result<(), PipelineError>) {
        self.recorder.record_embedding(self.start.elapsed(), result);
    }

    pub(crate) fn record_clustering(self, result: Result<AssignmentKind, PipelineError>) {
        self.recorder.record_clustering(self.start.elapsed(), result);
    }

    pub(crate) fn record_forward(self, result: Result<(), PipelineError>) {
        self.recorder.record_forward(self.start.elapsed(), result);
    }
}
