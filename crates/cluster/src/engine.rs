use std::sync::Arc;

use crate::similarity::{cosine_similarity, ema_update};
use crate::{
    Assignment, AssignmentKind, Centroid, ClusterConfig, ClusterError, ClusterStore, TopicId,
};


/// Outcome of the pure assignment decision for one embedding.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// No topic is close enough and there is room: open `topic_id`.
    NewTopic { topic_id: TopicId },
    /// Best topic meets the threshold.
    Match { topic_id: TopicId, similarity: f64 },
    /// Best topic is below threshold but `max_topics` is exhausted.
    Forced { topic_id: TopicId, similarity: f64 },
}

impl Decision {
    pub fn topic_id(&self) -> TopicId {
        match self {
            Decision::NewTopic { topic_id }
            | Decision::Match { topic_id, .. }
            | Decision::Forced { topic_id, .. } => *topic_id,
        }
    }
}

/// Decide where `embedding` belongs given a centroid snapshot.
///
/// Similarities are compared strictly, scanning topics in ascending id order,
/// so ties resolve to the lowest id. The new topic id is one past the highest
/// id in the snapshot; the store decides whether that id is still free.
pub fn decide(embedding: &[f32], centroids: &[Centroid], cfg: &ClusterConfig) -> Decision {
    let mut ordered: Vec<&Centroid> = centroids.iter().collect();
    ordered.sort_by_key(|c| c.topic_id);

    let mut best: Option<(TopicId, f64)> = None;
    for centroid in &ordered {
        let similarity = cosine_similarity(embedding, &centroid.vector);
        match best {
            Some((_, best_similarity)) if similarity <= best_similarity => {}
            _ => best = Some((centroid.topic_id, similarity)),
        }
    }

    match best {
        Some((topic_id, similarity)) if similarity >= cfg.similarity_threshold => {
            Decision::Match {
                topic_id,
                similarity,
            }
        }
        Some((topic_id, similarity)) if ordered.len() >= cfg.max_topics => Decision::Forced {
            topic_id,
            similarity,
        },
        _ => {
            let topic_id = ordered
                .last()
                .map(|c| c.topic_id.next())
                .unwrap_or(TopicId::FIRST);
            Decision::NewTopic { topic_id }
        }
    }
}

/// Drives [`decide`] against a [`ClusterStore`] with optimistic concurrency.
///
/// Store calls run on the blocking pool and are bounded by
/// [`ClusterConfig::store_timeout_ms`]. All attempts of one assignment share
/// the [`ClusterConfig::max_attempts`] budget.
pub struct ClusteringEngine {
    store: Arc<dyn ClusterStore>,
    cfg: ClusterConfig,
}

impl ClusteringEngine {
    pub fn new(store: Arc<dyn ClusterStore>, cfg: ClusterConfig) -> Result<Self, ClusterError> {
        cfg.validate()?;
        Ok(Self { store, cfg })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.cfg
    }

    pub fn store(&self) -> &Arc<dyn ClusterStore> {
        &self.store
    }

    /// Snapshot of every centroid, through the same timeout as the protocol.
    pub async fn topics(&self) -> Result<Vec<Centroid>, ClusterError> {
        self.call("list_all", |store| store.list_all()).await
    }

    /// Assign `embedding` to a topic and fold it into that topic's centroid.
    ///
    /// Returns [`ClusterError::Contention`] if every attempt lost a race.
    /// Store failures are returned as-is and leave nothing half-applied.
    pub async fn assign(&self, embedding: &[f32]) -> Result<Assignment, ClusterError> {
        validate_embedding(embedding, self.cfg.dimension)?;
        let embedding: Arc<[f32]> = Arc::from(embedding);
        let mut attempts = 0u32;

        loop {
            attempts = self.next_attempt(attempts)?;
            let snapshot = self.call("list_all", |store| store.list_all()).await?;
            if let Some(first) = snapshot.first() {
                if first.dimension() != embedding.len() {
                    return Err(ClusterError::DimensionMismatch {
                        expected: first.dimension(),
                        actual: embedding.len(),
                    });
                }
            }

            let (topic_id, similarity, kind) = match decide(&embedding, &snapshot, &self.cfg) {
                Decision::NewTopic { topic_id } => {
                    let initial = Arc::clone(&embedding);
                    let created = self
                        .call("create_if_absent", move |store| {
                            store.create_if_absent(topic_id, &initial)
                        })
                        .await?;
                    if created {
                        tracing::info!(topic_id = %topic_id, attempts, "opened new topic");
                        return Ok(Assignment {
                            topic_id,
                            similarity: 1.0,
                            kind: AssignmentKind::Created,
                            update_count: 0,
                            attempts,
                        });
                    }
                    tracing::debug!(
                        topic_id = %topic_id,
                        attempts,
                        "topic id taken by a concurrent writer, re-deciding"
                    );
                    continue;
                }
                Decision::Match {
                    topic_id,
                    similarity,
                } => (topic_id, similarity, AssignmentKind::Matched),
                Decision::Forced {
                    topic_id,
                    similarity,
                } => {
                    tracing::warn!(
                        topic_id = %topic_id,
                        similarity,
                        max_topics = self.cfg.max_topics,
                        "topic cap reached, forcing sub-threshold assignment"
                    );
                    (topic_id, similarity, AssignmentKind::Forced)
                }
            };

            let Some(current) = snapshot.into_iter().find(|c| c.topic_id == topic_id) else {
                return Err(ClusterError::MissingTopic(topic_id));
            };
            let update_count = self
                .update_centroid(current, &embedding, &mut attempts)
                .await?;
            return Ok(Assignment {
                topic_id,
                similarity,
                kind,
                update_count,
                attempts,
            });
        }
    }

    /// EMA update with compare-and-update, re-reading the topic on conflict.
    async fn update_centroid(
        &self,
        mut current: Centroid,
        embedding: &Arc<[f32]>,
        attempts: &mut u32,
    ) -> Result<u64, ClusterError> {
        let topic_id = current.topic_id;
        loop {
            let expected = current.update_count;
            let next_count = expected + 1;
            let updated = ema_update(&current.vector, embedding, self.cfg.ema_alpha);
            let swapped = self
                .call("compare_and_update", move |store| {
                    store.compare_and_update(topic_id, expected, &updated, next_count)
                })
                .await?;
            if swapped {
                return Ok(next_count);
            }

            tracing::debug!(
                topic_id = %topic_id,
                expected,
                attempts = *attempts,
                "centroid changed concurrently, retrying update"
            );
            *attempts = self.next_attempt(*attempts)?;
            current = self
                .call("get", move |store| store.get(topic_id))
                .await?
                .ok_or(ClusterError::MissingTopic(topic_id))?;
        }
    }

    fn next_attempt(&self, attempts: u32) -> Result<u32, ClusterError> {
        if attempts >= self.cfg.max_attempts {
            tracing::error!(
                attempts,
                max_attempts = self.cfg.max_attempts,
                "clustering contention budget exhausted"
            );
            return Err(ClusterError::Contention { attempts });
        }
        Ok(attempts + 1)
    }

    /// Run a store operation on the blocking pool under the store timeout.
    async fn call<T, F>(&self, operation: &'static str, op: F) -> Result<T, ClusterError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ClusterStore) -> Result<T, ClusterError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || op(store.as_ref()));
        match tokio::time::timeout(self.cfg.store_timeout(), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(ClusterError::StoreUnavailable(format!(
                "{operation} task failed: {join_err}"
            ))),
            Err(_) => Err(ClusterError::Timeout {
                operation,
                timeout_ms: self.cfg.store_timeout_ms,
            }),
        }
    }
}

fn validate_embedding(embedding: &[f32], dimension: Option<usize>) -> Result<(), ClusterError> {
    if embedding.is_empty() {
        return Err(ClusterError::InvalidEmbedding("embedding is empty".into()));
    }
    if let Some(idx) = embedding.iter().position(|x| !x.is_finite()) {
        return Err(ClusterError::InvalidEmbedding(format!(
            "component {idx} is not finite"
        )));
    }
    if let Some(expected) = dimension {
        if embedding.len() != expected {
            return Err(ClusterError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            });
        }
    }
    Ok(())
}
