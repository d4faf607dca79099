//! Online topic clustering
//!
//! Given a document embedding, this crate decides whether the document joins an
//! existing topic or opens a new one, and folds the embedding into the chosen
//! topic's centroid. It is safe to call from many tasks at once: every centroid
//! write goes through one of two atomic store primitives.
//!
//! - [`ClusterStore::create_if_absent`] opens a topic only if its id is unused,
//!   so two racing "new topic" decisions can never both win the same id.
//! - [`ClusterStore::compare_and_update`] replaces a centroid only if its
//!   `update_count` is unchanged, so concurrent EMA updates are never lost.
//!
//! Conflicts are resolved by re-reading and retrying inside a fixed attempt
//! budget ([`ClusterConfig::max_attempts`]). There is no global lock.
//!
//! ## Quick example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cluster::{ClusterConfig, ClusteringEngine, InMemoryClusterStore};
//!
//! # async fn run() -> Result<(), cluster::ClusterError> {
//! let store = Arc::new(InMemoryClusterStore::new());
//! let engine = ClusteringEngine::new(store, ClusterConfig::default())?;
//!
//! let assignment = engine.assign(&[0.1, 0.9, 0.0]).await?;
//! println!("{} ({}%)", assignment.topic_id, assignment.score_percent());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod similarity;
pub mod store;
pub mod types;

pub use crate::config::ClusterConfig;
pub use crate::engine::{decide, ClusteringEngine, Decision};
pub use crate::error::ClusterError;
pub use crate::similarity::{cosine_similarity, ema_update};
pub use crate::store::{ClusterStore, InMemoryClusterStore, StoreConfig};
#[cfg(feature = "backend-redb")]
pub use crate::store::RedbClusterStore;
pub use crate::types::{Assignment, AssignmentKind, Centroid, TopicId};
