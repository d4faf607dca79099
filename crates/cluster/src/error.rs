use bincode::error::{DecodeError, EncodeError};
use thiserror::Error;

use crate::types::TopicId;

/// Errors surfaced by cluster stores and the clustering engine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClusterError {
    /// The backing store failed or could not be reached. Retryable.
    #[error("cluster store unavailable: {0}")]
    StoreUnavailable(String),
    /// A store call did not finish within the configured timeout. Retryable.
    #[error("cluster store {operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },
    /// Every attempt lost a race against a concurrent writer.
    #[error("clustering contention: gave up after {attempts} attempts")]
    Contention { attempts: u32 },
    /// The embedding does not have the deployment's fixed dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// Empty vector or non-finite components.
    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),
    /// A topic chosen from a snapshot is no longer in the store.
    #[error("topic {0} disappeared from the store")]
    MissingTopic(TopicId),
    #[error("invalid cluster config: {0}")]
    InvalidConfig(String),
    #[error("centroid encode error: {0}")]
    Encode(String),
    #[error("centroid decode error: {0}")]
    Decode(String),
}

impl ClusterError {
    pub fn store<E: std::fmt::Display>(err: E) -> Self {
        Self::StoreUnavailable(err.to_string())
    }

    /// Whether redelivering the same work item may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClusterError::StoreUnavailable(_)
                | ClusterError::Timeout { .. }
                | ClusterError::MissingTopic(_)
                | ClusterError::Decode(_)
        )
    }
}

impl From<EncodeError> for ClusterError {
    fn from(e: EncodeError) -> Self {
        ClusterError::Encode(e.to_string())
    }
}

impl From<DecodeError> for ClusterError {
    fn from(e: DecodeError) -> Self {
        ClusterError::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ClusterError::store("io").is_retryable());
        assert!(ClusterError::Timeout {
            operation: "list_all",
            timeout_ms: 10
        }
        .is_retryable());
        assert!(!ClusterError::Contention { attempts: 3 }.is_retryable());
        assert!(!ClusterError::DimensionMismatch {
            expected: 3,
            actual: 2
        }
        .is_retryable());
        assert!(!ClusterError::InvalidEmbedding("empty".into()).is_retryable());
    }

    #[test]
    fn error_messages_carry_context() {
        let err = ClusterError::Contention { attempts: 3 };
        assert!(err.to_string().contains("3 attempts"));

        let err = ClusterError::MissingTopic(TopicId::new(4));
        assert!(err.to_string().contains("T4"));
    }
}
