use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::{Centroid, ClusterError, TopicId};

/// Durable, concurrently accessible centroid storage.
///
/// The two conditional writes are the only way a centroid may change. Each one
/// must be atomic with respect to every other call on the same store.
pub trait ClusterStore: Send + Sync {
    /// Snapshot of every centroid. Never returns a partially written vector.
    fn list_all(&self) -> Result<Vec<Centroid>, ClusterError>;
    /// Current state of one topic.
    fn get(&self, topic_id: TopicId) -> Result<Option<Centroid>, ClusterError>;
    /// Create `topic_id` with `update_count = 0` unless it already exists.
    /// Returns whether this call created it.
    fn create_if_absent(&self, topic_id: TopicId, initial: &[f32]) -> Result<bool, ClusterError>;
    /// Replace vector and count only if the stored count still equals
    /// `expected_update_count`. Returns whether the write happened.
    fn compare_and_update(
        &self,
        topic_id: TopicId,
        expected_update_count: u64,
        new_vector: &[f32],
        new_update_count: u64,
    ) -> Result<bool, ClusterError>;
}

/// Selects and builds a cluster store backend.
///
/// # Example
/// ```
/// use cluster::StoreConfig;
///
/// let store = StoreConfig::in_memory().build().unwrap();
/// assert!(store.list_all().unwrap().is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub enum StoreConfig {
    /// Redb file at `path`. Requires the `backend-redb` feature.
    Redb { path: String },
    /// Process-local map; for single-process deployments and tests.
    #[default]
    InMemory,
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        StoreConfig::InMemory
    }

    pub fn redb<P: Into<String>>(path: P) -> Self {
        StoreConfig::Redb { path: path.into() }
    }

    pub fn build(&self) -> Result<Arc<dyn ClusterStore>, ClusterError> {
        match self {
            StoreConfig::InMemory => Ok(Arc::new(InMemoryClusterStore::new())),
            StoreConfig::Redb { path } => {
                #[cfg(feature = "backend-redb")]
                {
                    Ok(Arc::new(RedbClusterStore::open(path)?))
                }
                #[cfg(not(feature = "backend-redb"))]
                {
                    let _ = path;
                    Err(ClusterError::store("redb backend disabled at compile time"))
                }
            }
        }
    }
}

/// In-memory store: a `RwLock` around an ordered map.
///
/// Every conditional write holds the write lock across its check and its
/// write, which makes it atomic.
pub struct InMemoryClusterStore {
    centroids: RwLock<BTreeMap<TopicId, Centroid>>,
}

impl InMemoryClusterStore {
    pub fn new() -> Self {
        Self {
            centroids: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryClusterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterStore for InMemoryClusterStore {
    fn list_all(&self) -> Result<Vec<Centroid>, ClusterError> {
        let guard = self
            .centroids
            .read()
            .map_err(|_| ClusterError::store("poisoned lock"))?;
        Ok(guard.values().cloned().collect())
    }

    fn get(&self, topic_id: TopicId) -> Result<Option<Centroid>, ClusterError> {
        let guard = self
            .centroids
            .read()
            .map_err(|_| ClusterError::store("poisoned lock"))?;
        Ok(guard.get(&topic_id).cloned())
    }

    fn create_if_absent(&self, topic_id: TopicId, initial: &[f32]) -> Result<bool, ClusterError> {
        let mut guard = self
            .centroids
            .write()
            .map_err(|_| ClusterError::store("poisoned lock"))?;
        if guard.contains_key(&topic_id) {
            return Ok(false);
        }
        guard.insert(topic_id, Centroid::new(topic_id, initial.to_vec()));
        Ok(true)
    }

    fn compare_and_update(
        &self,
        topic_id: TopicId,
        expected_update_count: u64,
        new_vector: &[f32],
        new_update_count: u64,
    ) -> Result<bool, ClusterError> {
        let mut guard = self
            .centroids
            .write()
            .map_err(|_| ClusterError::store("poisoned lock"))?;
        let Some(centroid) = guard.get_mut(&topic_id) else {
            return Err(ClusterError::MissingTopic(topic_id));
        };
        if centroid.update_count != expected_update_count {
            return Ok(false);
        }
        if centroid.vector.len() != new_vector.len() {
            return Err(ClusterError::DimensionMismatch {
                expected: centroid.vector.len(),
                actual: new_vector.len(),
            });
        }
        centroid.vector.clear();
        centroid.vector.extend_from_slice(new_vector);
        centroid.update_count = new_update_count;
        Ok(true)
    }
}

/// Redb-backed store that survives restarts and can be shared between
/// processes on one host.
#[cfg(feature = "backend-redb")]
pub mod redb;

#[cfg(feature = "backend-redb")]
pub use self::redb::RedbClusterStore;
