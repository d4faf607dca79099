//! Document and analysis-result storage.
//!
//! Both stores are keyed by `doc_id` and have overwrite semantics. They are
//! synchronous, like the centroid store, and the stage runner calls them on
//! the blocking pool under a timeout.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::types::{AnalysisResult, Document};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Backend failed or could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A stored record could not be (de)serialized.
    #[error("record codec error: {0}")]
    Codec(String),
}

impl StoreError {
    pub fn unavailable<E: std::fmt::Display>(err: E) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

/// Documents written by ingest, read by this stage.
pub trait DocumentStore: Send + Sync {
    fn get_document(&self, doc_id: &str) -> Result<Option<Document>, StoreError>;
    fn put_document(&self, document: &Document) -> Result<(), StoreError>;
    fn document_count(&self) -> Result<u64, StoreError>;
}

/// One analysis result per document, last write wins.
pub trait AnalysisStore: Send + Sync {
    fn get_analysis(&self, doc_id: &str) -> Result<Option<AnalysisResult>, StoreError>;
    fn put_analysis(&self, result: &AnalysisResult) -> Result<(), StoreError>;
    fn analysis_count(&self) -> Result<u64, StoreError>;
}

/// Selects the storage backend for documents and analyses.
///
/// # Example
/// ```
/// use echo::StorageConfig;
///
/// let (documents, analyses) = StorageConfig::in_memory().build().unwrap();
/// assert_eq!(documents.document_count().unwrap(), 0);
/// assert_eq!(analyses.analysis_count().unwrap(), 0);
/// ```
#[derive(Clone, Debug, Default)]
pub enum StorageConfig {
    /// Redb file at `path`. Requires the `embedded` feature.
    Redb { path: String },
    #[default]
    InMemory,
}

impl StorageConfig {
    pub fn in_memory() -> Self {
        StorageConfig::InMemory
    }

    pub fn redb<P: Into<String>>(path: P) -> Self {
        StorageConfig::Redb { path: path.into() }
    }

    /// Build both stores. They share one backend instance.
    #[allow(clippy::type_complexity)]
    pub fn build(&self) -> Result<(Arc<dyn DocumentStore>, Arc<dyn AnalysisStore>), StoreError> {
        match self {
            StorageConfig::InMemory => {
                let store = Arc::new(InMemoryStore::new());
                let documents: Arc<dyn DocumentStore> = store.clone();
                let analyses: Arc<dyn AnalysisStore> = store;
                Ok((documents, analyses))
            }
            StorageConfig::Redb { path } => {
                #[cfg(feature = "embedded")]
                {
                    let store = Arc::new(RedbStore::open(path)?);
                    let documents: Arc<dyn DocumentStore> = store.clone();
                    let analyses: Arc<dyn AnalysisStore> = store;
                    Ok((documents, analyses))
                }
                #[cfg(not(feature = "embedded"))]
                {
                    let _ = path;
                    Err(StoreError::Unavailable(
                        "redb backend disabled at compile time".into(),
                    ))
                }
            }
        }
    }
}

/// Process-local maps behind `RwLock`s.
#[derive(Default)]
pub struct InMemoryStore {
    documents: RwLock<HashMap<String, Document>>,
    analyses: RwLock<HashMap<String, AnalysisResult>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("poisoned lock".into())
}

impl DocumentStore for InMemoryStore {
    fn get_document(&self, doc_id: &str) -> Result<Option<Document>, StoreError> {
        let guard = self.documents.read().map_err(poisoned)?;
        Ok(guard.get(doc_id).cloned())
    }

    fn put_document(&self, document: &Document) -> Result<(), StoreError> {
        let mut guard = self.documents.write().map_err(poisoned)?;
        guard.insert(document.id.clone(), document.clone());
        Ok(())
    }

    fn document_count(&self) -> Result<u64, StoreError> {
        let guard = self.documents.read().map_err(poisoned)?;
        Ok(guard.len() as u64)
    }
}

impl AnalysisStore for InMemoryStore {
    fn get_analysis(&self, doc_id: &str) -> Result<Option<AnalysisResult>, StoreError> {
        let guard = self.analyses.read().map_err(poisoned)?;
        Ok(guard.get(doc_id).cloned())
    }

    fn put_analysis(&self, result: &AnalysisResult) -> Result<(), StoreError> {
        let mut guard = self.analyses.write().map_err(poisoned)?;
        guard.insert(result.doc_id.clone(), result.clone());
        Ok(())
    }

    fn analysis_count(&self) -> Result<u64, StoreError> {
        let guard = self.analyses.read().map_err(poisoned)?;
        Ok(guard.len() as u64)
    }
}

#[cfg(feature = "embedded")]
mod redb;

#[cfg(feature = "embedded")]
pub use self::redb::RedbStore;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cluster::{AssignmentKind, TopicId};

    fn result(doc_id: &str, topic: u32) -> AnalysisResult {
        AnalysisResult {
            doc_id: doc_id.into(),
            topic_id: TopicId::new(topic),
            similarity_score: 0.9,
            score: 90,
            assignment: AssignmentKind::Matched,
            model: "test".into(),
            analyzed_at: Utc::now(),
        }
    }

    #[test]
    fn in_memory_documents_roundtrip() {
        let store = InMemoryStore::new();
        assert!(store.get_document("a").unwrap().is_none());

        store
            .put_document(&Document::new("a", "Title", "Body"))
            .unwrap();
        let doc = store.get_document("a").unwrap().unwrap();
        assert_eq!(doc.title, "Title");
        assert_eq!(store.document_count().unwrap(), 1);
    }

    #[test]
    fn in_memory_analysis_overwrites() {
        let store = InMemoryStore::new();
        store.put_analysis(&result("a", 1)).unwrap();
        store.put_analysis(&result("a", 2)).unwrap();

        assert_eq!(store.analysis_count().unwrap(), 1);
        assert_eq!(
            store.get_analysis("a").unwrap().unwrap().topic_id,
            TopicId::new(2)
        );
    }

    #[test]
    fn storage_config_shares_backend() {
        let (documents, analyses) = StorageConfig::in_memory().build().unwrap();
        documents
            .put_document(&Document::new("x", "t", "b"))
            .unwrap();
        analyses.put_analysis(&result("x", 1)).unwrap();
        assert_eq!(documents.document_count().unwrap(), 1);
        assert_eq!(analyses.analysis_count().unwrap(), 1);
    }
}
