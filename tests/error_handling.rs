//! Failure classification of the stage runner: what is acknowledged, what is
//! left for redelivery, and what is (not) written on the way.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use echo::{
    AnalysisResult, AnalysisStore, Centroid, ClusterConfig, ClusterError, ClusterStore,
    ClusteringEngine, Disposition, Document, DocumentStore, EmbedError, Embedding,
    EmbeddingProvider, InMemoryClusterStore, InMemoryQueue, InMemoryStore, MessagePublisher,
    PipelineError, PublishError, StageMessage, StageRunner, StageSettings, StageState,
    StoreError, TopicId, decode_stage_message,
};

/// Returns a fixed vector, or a fixed error.
struct FixedProvider {
    result: Result<Vec<f32>, EmbedError>,
    delay: Option<Duration>,
}

impl FixedProvider {
    fn ok(vector: Vec<f32>) -> Self {
        Self {
            result: Ok(vector),
            delay: None,
        }
    }

    fn failing(err: EmbedError) -> Self {
        Self {
            result: Err(err),
            delay: None,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FixedProvider {
    fn model_name(&self) -> &str {
        "fixed"
    }

    async fn embed(&self, _text: &str) -> Result<Embedding, EmbedError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone().map(|vector| Embedding {
            vector,
            model_name: "fixed".into(),
            normalized: true,
        })
    }
}

struct FailingPublisher;

#[async_trait]
impl MessagePublisher for FailingPublisher {
    async fn publish(&self, _topic: &str, _message: &StageMessage) -> Result<(), PublishError> {
        Err(PublishError::Http(503))
    }
}

/// Document store that is down.
struct DownStore;

impl DocumentStore for DownStore {
    fn get_document(&self, _doc_id: &str) -> Result<Option<Document>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    fn put_document(&self, _document: &Document) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    fn document_count(&self) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Analysis store that rejects writes.
struct ReadOnlyAnalyses;

impl AnalysisStore for ReadOnlyAnalyses {
    fn get_analysis(&self, _doc_id: &str) -> Result<Option<AnalysisResult>, StoreError> {
        Ok(None)
    }
    fn put_analysis(&self, _result: &AnalysisResult) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("read-only replica".into()))
    }
    fn analysis_count(&self) -> Result<u64, StoreError> {
        Ok(0)
    }
}

/// Every compare-and-update loses, as if another writer always got there
/// first.
struct AlwaysContended {
    topic: Centroid,
    cas_calls: AtomicUsize,
}

impl ClusterStore for AlwaysContended {
    fn list_all(&self) -> Result<Vec<Centroid>, ClusterError> {
        Ok(vec![self.topic.clone()])
    }
    fn get(&self, _topic_id: TopicId) -> Result<Option<Centroid>, ClusterError> {
        Ok(Some(self.topic.clone()))
    }
    fn create_if_absent(&self, _topic_id: TopicId, _initial: &[f32]) -> Result<bool, ClusterError> {
        Ok(false)
    }
    fn compare_and_update(
        &self,
        _topic_id: TopicId,
        _expected_update_count: u64,
        _new_vector: &[f32],
        _new_update_count: u64,
    ) -> Result<bool, ClusterError> {
        self.cas_calls.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    queue: Arc<InMemoryQueue>,
    runner: StageRunner,
}

fn harness(provider: FixedProvider) -> Harness {
    harness_with(provider, Arc::new(InMemoryClusterStore::new()))
}

fn harness_with(provider: FixedProvider, clusters: Arc<dyn ClusterStore>) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let queue = Arc::new(InMemoryQueue::new());
    let engine = ClusteringEngine::new(clusters, ClusterConfig::default()).unwrap();
    let runner = StageRunner::new(
        store.clone(),
        store.clone(),
        Arc::new(provider),
        Arc::new(engine),
        queue.clone(),
        StageSettings::default(),
    );
    Harness {
        store,
        queue,
        runner,
    }
}

fn seed(store: &InMemoryStore, id: &str) {
    store
        .put_document(&Document::new(id, "Title", "Body text"))
        .unwrap();
}

#[tokio::test]
async fn missing_document_is_acknowledged() {
    let h = harness(FixedProvider::ok(vec![1.0, 0.0]));

    let err = h.runner.process("ghost").await.unwrap_err();
    assert_eq!(
        err,
        PipelineError::NotFound {
            doc_id: "ghost".into()
        }
    );
    assert_eq!(err.disposition(), Disposition::Ack);
    assert_eq!(h.queue.len("analyzed"), 0);
}

#[tokio::test]
async fn blank_doc_id_is_invalid() {
    let h = harness(FixedProvider::ok(vec![1.0, 0.0]));
    let err = h.runner.process("   ").await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidMessage(_)));
    assert_eq!(err.disposition(), Disposition::Ack);
}

#[test]
fn undecodable_bodies_are_invalid_messages() {
    for body in [&b"not json"[..], br#"{"title":"x"}"#, br#"{"doc_id":"  "}"#] {
        let err = decode_stage_message(body).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidMessage(_)), "{err}");
    }
    assert_eq!(
        decode_stage_message(br#"{"doc_id":"d1"}"#).unwrap(),
        StageMessage::new("d1")
    );
}

#[tokio::test]
async fn empty_document_is_acknowledged_without_embedding() {
    let h = harness(FixedProvider::ok(vec![1.0, 0.0]));
    h.store
        .put_document(&Document::new("empty", "  ", "\n"))
        .unwrap();

    let err = h.runner.process("empty").await.unwrap_err();
    assert!(matches!(err, PipelineError::EmptyDocument { .. }));
    assert_eq!(err.state(), StageState::Embedding);
    assert_eq!(err.disposition(), Disposition::Ack);
}

#[tokio::test]
async fn provider_failure_is_retried_and_writes_nothing() {
    let h = harness(FixedProvider::failing(EmbedError::Http {
        status: 503,
        body: "overloaded".into(),
    }));
    seed(&h.store, "d1");

    let err = h.runner.process("d1").await.unwrap_err();
    assert!(matches!(err, PipelineError::EmbeddingUnavailable(_)));
    assert_eq!(err.disposition(), Disposition::Retry);
    assert!(h.store.get_analysis("d1").unwrap().is_none());
    assert_eq!(h.queue.len("analyzed"), 0);
}

#[tokio::test]
async fn slow_provider_times_out_as_retryable() {
    let mut provider = FixedProvider::ok(vec![1.0, 0.0]);
    provider.delay = Some(Duration::from_millis(500));
    let store = Arc::new(InMemoryStore::new());
    seed(&store, "slow");
    let engine = ClusteringEngine::new(
        Arc::new(InMemoryClusterStore::new()),
        ClusterConfig::default(),
    )
    .unwrap();
    let settings = StageSettings {
        embed_timeout: Duration::from_millis(50),
        ..StageSettings::default()
    };
    let runner = StageRunner::new(
        store.clone(),
        store.clone(),
        Arc::new(provider),
        Arc::new(engine),
        Arc::new(InMemoryQueue::new()),
        settings,
    );

    let err = runner.process("slow").await.unwrap_err();
    assert!(matches!(err, PipelineError::EmbeddingUnavailable(ref m) if m.contains("timed out")));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn non_finite_embedding_is_terminal() {
    let h = harness(FixedProvider::ok(vec![f32::NAN, 1.0]));
    seed(&h.store, "nan");

    let err = h.runner.process("nan").await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidEmbedding(_)));
    assert_eq!(err.disposition(), Disposition::Ack);
}

#[tokio::test]
async fn document_store_outage_is_retryable() {
    let store = Arc::new(InMemoryStore::new());
    let engine = ClusteringEngine::new(
        Arc::new(InMemoryClusterStore::new()),
        ClusterConfig::default(),
    )
    .unwrap();
    let runner = StageRunner::new(
        Arc::new(DownStore),
        store,
        Arc::new(FixedProvider::ok(vec![1.0, 0.0])),
        Arc::new(engine),
        Arc::new(InMemoryQueue::new()),
        StageSettings::default(),
    );

    let err = runner.process("d1").await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::StoreUnavailable {
            state: StageState::Received,
            ..
        }
    ));
    assert_eq!(err.disposition(), Disposition::Retry);
}

#[tokio::test]
async fn persist_failure_is_retryable_and_not_forwarded() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, "d1");
    let queue = Arc::new(InMemoryQueue::new());
    let engine = ClusteringEngine::new(
        Arc::new(InMemoryClusterStore::new()),
        ClusterConfig::default(),
    )
    .unwrap();
    let runner = StageRunner::new(
        store,
        Arc::new(ReadOnlyAnalyses),
        Arc::new(FixedProvider::ok(vec![1.0, 0.0])),
        Arc::new(engine),
        queue.clone(),
        StageSettings::default(),
    );

    let err = runner.process("d1").await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::StoreUnavailable {
            state: StageState::Clustering,
            ..
        }
    ));
    assert!(err.is_retryable());
    assert_eq!(queue.len("analyzed"), 0);
}

#[tokio::test]
async fn forward_failure_keeps_the_persisted_result() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store, "d1");
    let engine = ClusteringEngine::new(
        Arc::new(InMemoryClusterStore::new()),
        ClusterConfig::default(),
    )
    .unwrap();
    let runner = StageRunner::new(
        store.clone(),
        store.clone(),
        Arc::new(FixedProvider::ok(vec![1.0, 0.0])),
        Arc::new(engine),
        Arc::new(FailingPublisher),
        StageSettings::default(),
    );

    let err = runner.process("d1").await.unwrap_err();
    assert!(matches!(err, PipelineError::ForwardFailed { ref topic, .. } if topic == "analyzed"));
    assert_eq!(err.state(), StageState::Persisted);
    assert_eq!(err.disposition(), Disposition::Retry);
    assert!(store.get_analysis("d1").unwrap().is_some());
}

#[tokio::test]
async fn exhausted_contention_is_terminal() {
    let clusters = Arc::new(AlwaysContended {
        topic: Centroid::new(TopicId::FIRST, vec![1.0, 0.0]),
        cas_calls: AtomicUsize::new(0),
    });
    let h = harness_with(FixedProvider::ok(vec![1.0, 0.0]), clusters.clone());
    seed(&h.store, "d1");

    let err = h.runner.process("d1").await.unwrap_err();
    assert_eq!(err, PipelineError::ClusteringContention { attempts: 3 });
    assert_eq!(err.disposition(), Disposition::Ack);
    assert_eq!(clusters.cas_calls.load(Ordering::SeqCst), 3);
    assert!(h.store.get_analysis("d1").unwrap().is_none());
    assert_eq!(h.queue.len("analyzed"), 0);
}
