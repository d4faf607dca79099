//! Process-wide wiring of stores, engine, provider and publisher.
//!
//! [`PipelineResources::init`] is called once at startup. Everything it
//! builds is shared behind `Arc`s by all in-flight requests.

use std::sync::Arc;

use cluster::{ClusterError, ClusterStore, ClusteringEngine, InMemoryClusterStore};
use embed::{EmbedError, EmbeddingProvider};
use thiserror::Error;

use crate::config::{ConfigLoadError, EchoConfig};
use crate::queue::{HttpPublisher, InMemoryQueue, MessagePublisher, PublishError};
use crate::stage::{StageRunner, StageSettings};
use crate::store::{AnalysisStore, DocumentStore, StorageConfig, StoreError};

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigLoadError),

    #[error("storage init failed: {0}")]
    Store(#[from] StoreError),

    #[error("cluster init failed: {0}")]
    Cluster(#[from] ClusterError),

    #[error("embedding provider init failed: {0}")]
    Embed(#[from] EmbedError),

    #[error("queue init failed: {0}")]
    Queue(#[from] PublishError),
}

struct Stores {
    documents: Arc<dyn DocumentStore>,
    analyses: Arc<dyn AnalysisStore>,
    clusters: Arc<dyn ClusterStore>,
}

pub struct PipelineResources {
    config: EchoConfig,
    documents: Arc<dyn DocumentStore>,
    analyses: Arc<dyn AnalysisStore>,
    clusters: Arc<dyn ClusterStore>,
    engine: Arc<ClusteringEngine>,
    embedder: Arc<dyn EmbeddingProvider>,
    publisher: Arc<dyn MessagePublisher>,
    memory_queue: Option<Arc<InMemoryQueue>>,
    runner: Arc<StageRunner>,
}

impl PipelineResources {
    /// Validate `config` and build every shared component.
    pub fn init(config: EchoConfig) -> Result<Self, ResourceError> {
        config.validate()?;

        let Stores {
            documents,
            analyses,
            clusters,
        } = open_stores(&config)?;

        let engine = Arc::new(ClusteringEngine::new(
            Arc::clone(&clusters),
            config.clustering.clone(),
        )?);
        let embedder = embed::build_provider(&config.embedding)?;

        let (publisher, memory_queue) = build_publisher(&config)?;

        let runner = Arc::new(StageRunner::new(
            Arc::clone(&documents),
            Arc::clone(&analyses),
            Arc::clone(&embedder),
            Arc::clone(&engine),
            Arc::clone(&publisher),
            StageSettings::from(&config.stage),
        ));

        tracing::info!(
            storage = %config.storage.backend,
            model = embedder.model_name(),
            queue = %config.queue.backend,
            threshold = config.clustering.similarity_threshold,
            max_topics = config.clustering.max_topics,
            "pipeline resources initialized"
        );

        Ok(Self {
            config,
            documents,
            analyses,
            clusters,
            engine,
            embedder,
            publisher,
            memory_queue,
            runner,
        })
    }

    pub fn config(&self) -> &EchoConfig {
        &self.config
    }

    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    pub fn analyses(&self) -> &Arc<dyn AnalysisStore> {
        &self.analyses
    }

    pub fn clusters(&self) -> &Arc<dyn ClusterStore> {
        &self.clusters
    }

    pub fn engine(&self) -> &Arc<ClusteringEngine> {
        &self.engine
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn publisher(&self) -> &Arc<dyn MessagePublisher> {
        &self.publisher
    }

    /// The local queue, when `queue.backend` is `in_memory`.
    pub fn memory_queue(&self) -> Option<&Arc<InMemoryQueue>> {
        self.memory_queue.as_ref()
    }

    pub fn runner(&self) -> &Arc<StageRunner> {
        &self.runner
    }
}

#[allow(clippy::type_complexity)]
fn build_publisher(
    config: &EchoConfig,
) -> Result<(Arc<dyn MessagePublisher>, Option<Arc<InMemoryQueue>>), ResourceError> {
    match config.queue.backend.as_str() {
        "http" => {
            let publisher: Arc<dyn MessagePublisher> = Arc::new(HttpPublisher::new(
                config.queue.endpoints.clone(),
                config.stage.publish_timeout(),
                config.queue.push_envelope,
            )?);
            Ok((publisher, None))
        }
        _ => {
            let queue = Arc::new(InMemoryQueue::new());
            let publisher: Arc<dyn MessagePublisher> = queue.clone();
            Ok((publisher, Some(queue)))
        }
    }
}

fn open_stores(config: &EchoConfig) -> Result<Stores, ResourceError> {
    match config.storage.to_storage_config() {
        StorageConfig::Redb { path } => open_redb(&path),
        in_memory => {
            let (documents, analyses) = in_memory.build()?;
            Ok(Stores {
                documents,
                analyses,
                clusters: Arc::new(InMemoryClusterStore::new()),
            })
        }
    }
}

/// One database file holds documents, analyses and centroids.
#[cfg(feature = "embedded")]
fn open_redb(path: &str) -> Result<Stores, ResourceError> {
    use cluster::RedbClusterStore;

    use crate::store::RedbStore;

    let db = redb::Database::create(path).map_err(StoreError::unavailable)?;
    let db = Arc::new(db);
    let store = Arc::new(RedbStore::from_database(Arc::clone(&db))?);
    let documents: Arc<dyn DocumentStore> = store.clone();
    let analyses: Arc<dyn AnalysisStore> = store;
    Ok(Stores {
        documents,
        analyses,
        clusters: Arc::new(RedbClusterStore::from_database(db)?),
    })
}

#[cfg(not(feature = "embedded"))]
fn open_redb(_path: &str) -> Result<Stores, ResourceError> {
    Err(StoreError::Unavailable("redb backend disabled at compile time".into()).into())
}
