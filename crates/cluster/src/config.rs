use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ClusterError;

/// Tuning for assignment decisions and the store retry protocol.
///
/// # Example
/// ```
/// use cluster::ClusterConfig;
///
/// let cfg = ClusterConfig {
///     similarity_threshold: 0.75,
///     max_topics: 50,
///     ..Default::default()
/// };
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Minimum cosine similarity (`τ`) for joining an existing topic.
    pub similarity_threshold: f64,
    /// EMA weight (`α`) of the incoming embedding.
    pub ema_alpha: f32,
    /// Hard cap on the number of topics. Once reached, documents are
    /// force-assigned to the closest topic.
    pub max_topics: usize,
    /// Store round-trips allowed for one assignment before giving up with
    /// [`ClusterError::Contention`].
    pub max_attempts: u32,
    /// Fixed embedding dimension. When unset, the dimension of the first
    /// stored centroid is enforced.
    pub dimension: Option<usize>,
    /// Upper bound on any single store call.
    pub store_timeout_ms: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            ema_alpha: 0.1,
            max_topics: 20,
            max_attempts: 3,
            dimension: None,
            store_timeout_ms: 3_000,
        }
    }
}

impl ClusterConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Upper bound on the time one [`ClusteringEngine::assign`] can spend in
    /// store calls: each attempt makes at most a read and a conditional write.
    ///
    /// [`ClusteringEngine::assign`]: crate::ClusteringEngine::assign
    pub fn assign_budget(&self) -> Duration {
        self.store_timeout() * self.max_attempts.saturating_mul(2)
    }

    pub fn validate(&self) -> Result<(), ClusterError> {
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ClusterError::InvalidConfig(
                "similarity_threshold must be within [-1, 1]".into(),
            ));
        }
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return Err(ClusterError::InvalidConfig(
                "ema_alpha must be within (0, 1]".into(),
            ));
        }
        if self.max_topics == 0 {
            return Err(ClusterError::InvalidConfig(
                "max_topics must be >= 1".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ClusterError::InvalidConfig(
                "max_attempts must be >= 1".into(),
            ));
        }
        if self.dimension == Some(0) {
            return Err(ClusterError::InvalidConfig(
                "dimension must be >= 1 when set".into(),
            ));
        }
        if self.store_timeout_ms == 0 {
            return Err(ClusterError::InvalidConfig(
                "store_timeout_ms must be >= 1".into(),
            ));
        }
        Ok(())
    }
}
