use async_trait::async_trait;
use fxhash::hash64;

use crate::{EmbedConfig, EmbedError, Embedding, EmbeddingProvider};

/// Deterministic offline provider.
///
/// Every lowercase alphanumeric token is hashed into one of `dimension`
/// buckets with a hash-derived sign (the "hashing trick"). Texts that share
/// vocabulary share buckets, so cosine similarity tracks word overlap.
#[derive(Debug, Clone)]
pub struct StubEmbedder {
    dimension: usize,
    model_name: String,
    normalize: bool,
}

impl StubEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_name: format!("hashed-bow-{dimension}"),
            normalize: true,
        }
    }

    pub fn from_config(cfg: &EmbedConfig) -> Self {
        Self {
            dimension: cfg.dimension,
            model_name: cfg.resolved_model_name(),
            normalize: cfg.normalize,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Synchronous core of [`EmbeddingProvider::embed`].
    pub fn embed_text(&self, text: &str) -> Result<Embedding, EmbedError> {
        let mut vector = vec![0f32; self.dimension];
        let mut tokens = 0usize;
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let h = hash64(token.to_lowercase().as_bytes());
            let bucket = (h % self.dimension as u64) as usize;
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
            tokens += 1;
        }
        if tokens == 0 {
            return Err(EmbedError::EmptyInput);
        }
        Ok(Embedding::from_raw(
            vector,
            self.model_name.clone(),
            self.normalize,
        ))
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbedError> {
        self.embed_text(text)
    }
}
