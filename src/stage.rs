//! Per-document orchestration.
//!
//! [`StageRunner::process`] walks one document through
//! `Received -> Embedding -> Clustering -> Persisted -> Forwarded`. Each step
//! is bounded by its own timeout. A failure after `Persisted` is retryable
//! from the top: the analysis write is an overwrite, so replaying it is safe.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cluster::ClusteringEngine;
use embed::{EmbedError, EmbeddingProvider};

use crate::config::StageYamlConfig;
use crate::queue::MessagePublisher;
use crate::store::{AnalysisStore, DocumentStore, StoreError};
use crate::types::{AnalysisResult, StageMessage};
use crate::{MetricsSpan, PipelineError, StageState};

/// Timeouts and routing for one runner.
#[derive(Debug, Clone)]
pub struct StageSettings {
    pub embed_timeout: Duration,
    pub store_timeout: Duration,
    pub publish_timeout: Duration,
    pub forward_topic: String,
}

impl Default for StageSettings {
    fn default() -> Self {
        StageSettings::from(&StageYamlConfig::default())
    }
}

impl From<&StageYamlConfig> for StageSettings {
    fn from(cfg: &StageYamlConfig) -> Self {
        Self {
            embed_timeout: cfg.embed_timeout(),
            store_timeout: cfg.store_timeout(),
            publish_timeout: cfg.publish_timeout(),
            forward_topic: cfg.forward_topic.clone(),
        }
    }
}

/// A successfully forwarded document.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub result: AnalysisResult,
    pub state: StageState,
    /// Clustering store round-trips spent on this document.
    pub attempts: u32,
}

pub struct StageRunner {
    documents: Arc<dyn DocumentStore>,
    analyses: Arc<dyn AnalysisStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    engine: Arc<ClusteringEngine>,
    publisher: Arc<dyn MessagePublisher>,
    settings: StageSettings,
}

impl StageRunner {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        analyses: Arc<dyn AnalysisStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        engine: Arc<ClusteringEngine>,
        publisher: Arc<dyn MessagePublisher>,
        settings: StageSettings,
    ) -> Self {
        Self {
            documents,
            analyses,
            embedder,
            engine,
            publisher,
            settings,
        }
    }

    pub fn settings(&self) -> &StageSettings {
        &self.settings
    }

    /// Longest [`process`](Self::process) can take before one of its step
    /// timeouts fires: fetch, embed, cluster, persist and forward.
    pub fn worst_case_latency(&self) -> Duration {
        self.settings.store_timeout * 2
            + self.settings.embed_timeout
            + self.engine.config().assign_budget()
            + self.settings.publish_timeout
    }

    /// Process a decoded inbound message.
    pub async fn handle_message(&self, message: &StageMessage) -> Result<StageOutcome, PipelineError> {
        self.process(&message.doc_id).await
    }

    /// Run the whole stage for `doc_id` and log the outcome.
    ///
    /// Terminal failures are logged at `error`/`warn`, retryable ones at
    /// `warn`; the caller maps the error to an acknowledgement via
    /// [`PipelineError::disposition`].
    pub async fn process(&self, doc_id: &str) -> Result<StageOutcome, PipelineError> {
        let doc_id = doc_id.trim();
        let result = self.run(doc_id).await;
        match &result {
            Ok(outcome) => tracing::info!(
                doc_id,
                topic_id = %outcome.result.topic_id,
                score = outcome.result.score,
                assignment = outcome.result.assignment.as_str(),
                attempts = outcome.attempts,
                "document analyzed"
            ),
            Err(err @ PipelineError::NotFound { .. }) => tracing::error!(
                doc_id,
                state = %err.state(),
                "document missing from store, acknowledging without analysis (data loss)"
            ),
            Err(err @ PipelineError::ClusteringContention { .. }) => tracing::error!(
                doc_id,
                error = %err,
                state = %err.state(),
                "clustering contention exhausted, acknowledging without analysis"
            ),
            Err(err) if err.is_retryable() => tracing::warn!(
                doc_id,
                state = %err.state(),
                error = %err,
                "retryable failure, leaving message unacknowledged"
            ),
            Err(err) => tracing::warn!(
                doc_id,
                state = %err.state(),
                error = %err,
                "terminal failure, acknowledging"
            ),
        }
        result
    }

    async fn run(&self, doc_id: &str) -> Result<StageOutcome, PipelineError> {
        if doc_id.is_empty() {
            return Err(PipelineError::InvalidMessage("missing doc_id".into()));
        }
        transition(doc_id, StageState::Received);

        let documents = Arc::clone(&self.documents);
        let key = doc_id.to_string();
        let document = self
            .blocking(StageState::Received, move || documents.get_document(&key))
            .await?
            .ok_or_else(|| PipelineError::NotFound {
                doc_id: doc_id.to_string(),
            })?;

        transition(doc_id, StageState::Embedding);
        let text = document.embedding_text();
        if text.is_empty() {
            return Err(PipelineError::EmptyDocument {
                doc_id: doc_id.to_string(),
            });
        }
        let span = MetricsSpan::start();
        let embedded = self.embed(doc_id, &text).await;
        if let Some(span) = span {
            span.record_embedding(embedded.as_ref().map(|_| ()).map_err(|e| e.clone()));
        }
        let embedding = embedded?;

        transition(doc_id, StageState::Clustering);
        let span = MetricsSpan::start();
        let assigned = self
            .engine
            .assign(&embedding.vector)
            .await
            .map_err(PipelineError::from);
        if let Some(span) = span {
            span.record_clustering(assigned.as_ref().map(|a| a.kind).map_err(|e| e.clone()));
        }
        let assignment = assigned?;

        let result = AnalysisResult::from_assignment(doc_id, &assignment, &embedding.model_name);
        let analyses = Arc::clone(&self.analyses);
        let record = result.clone();
        self.blocking(StageState::Clustering, move || analyses.put_analysis(&record))
            .await?;
        transition(doc_id, StageState::Persisted);

        let span = MetricsSpan::start();
        let forwarded = self.forward(doc_id).await;
        if let Some(span) = span {
            span.record_forward(forwarded.clone());
        }
        forwarded?;
        transition(doc_id, StageState::Forwarded);

        Ok(StageOutcome {
            result,
            state: StageState::Forwarded,
            attempts: assignment.attempts,
        })
    }

    async fn embed(&self, doc_id: &str, text: &str) -> Result<embed::Embedding, PipelineError> {
        let timeout = self.settings.embed_timeout;
        match with_timeout(timeout, self.embedder.embed(text)).await {
            Some(Ok(embedding)) => Ok(embedding),
            Some(Err(EmbedError::EmptyInput)) => Err(PipelineError::EmptyDocument {
                doc_id: doc_id.to_string(),
            }),
            Some(Err(err)) => Err(PipelineError::EmbeddingUnavailable(err.to_string())),
            None => Err(PipelineError::EmbeddingUnavailable(format!(
                "timed out after {} ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn forward(&self, doc_id: &str) -> Result<(), PipelineError> {
        let topic = self.settings.forward_topic.as_str();
        let message = StageMessage::new(doc_id);
        let timeout = self.settings.publish_timeout;
        match with_timeout(timeout, self.publisher.publish(topic, &message)).await {
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => Err(PipelineError::ForwardFailed {
                topic: topic.to_string(),
                message: err.to_string(),
            }),
            None => Err(PipelineError::ForwardFailed {
                topic: topic.to_string(),
                message: format!("timed out after {} ms", timeout.as_millis()),
            }),
        }
    }

    /// Run a synchronous store call on the blocking pool under the store
    /// timeout.
    async fn blocking<T, F>(&self, state: StageState, op: F) -> Result<T, PipelineError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    {
        let timeout = self.settings.store_timeout;
        match with_timeout(timeout, tokio::task::spawn_blocking(op)).await {
            Some(Ok(Ok(value))) => Ok(value),
            Some(Ok(Err(err))) => Err(PipelineError::StoreUnavailable {
                state,
                message: err.to_string(),
            }),
            Some(Err(join_err)) => Err(PipelineError::StoreUnavailable {
                state,
                message: format!("store task failed: {join_err}"),
            }),
            None => Err(PipelineError::StoreUnavailable {
                state,
                message: format!("timed out after {} ms", timeout.as_millis()),
            }),
        }
    }
}

async fn with_timeout<F: Future>(timeout: Duration, fut: F) -> Option<F::Output> {
    tokio::time::timeout(timeout, fut).await.ok()
}

fn transition(doc_id: &str, state: StageState) {
    tracing::debug!(doc_id, state = %state, "stage transition");
}
