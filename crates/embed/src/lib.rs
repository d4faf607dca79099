//! Echo embedding providers
//!
//! This crate turns document text into the fixed-length vectors the
//! clustering stage consumes. Providers sit behind one async trait so the
//! stage runner never cares where a vector came from.
//!
//! Two providers ship today:
//!
//! - **Stub** - feature hashing of lowercase tokens into a fixed number of
//!   buckets, L2-normalized. Deterministic, offline, and texts that share
//!   words end up with similar vectors, which makes it good enough for local
//!   runs and tests.
//! - **API** - POSTs the text to an HTTP inference endpoint. Hugging Face,
//!   OpenAI and "custom" payload shapes are understood.
//!
//! Retries are not done here. A failed call surfaces as an [`EmbedError`] and
//! the caller decides whether the message should be redelivered.
//!
//! ## Quick example
//!
//! ```
//! use embed::{build_provider, EmbedConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let provider = build_provider(&EmbedConfig::default()).unwrap();
//! let embedding = provider.embed("Sparse attention for long documents").await.unwrap();
//! assert_eq!(embedding.dimension(), 384);
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

pub mod config;
pub mod error;
pub mod types;

mod api;
mod stub;

pub use crate::api::ApiEmbedder;
pub use crate::config::EmbedConfig;
pub use crate::error::EmbedError;
pub use crate::stub::StubEmbedder;
pub use crate::types::Embedding;

/// Anything that can turn text into an embedding.
///
/// Implementations must be cheap to share: one instance is built per process
/// and called concurrently from every in-flight request.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Label recorded next to every analysis result.
    fn model_name(&self) -> &str;

    /// Embed `text`. Blank input is rejected with [`EmbedError::EmptyInput`].
    async fn embed(&self, text: &str) -> Result<Embedding, EmbedError>;
}

/// Build the provider selected by `cfg.mode`.
pub fn build_provider(cfg: &EmbedConfig) -> Result<Arc<dyn EmbeddingProvider>, EmbedError> {
    cfg.validate()?;
    match cfg.mode.as_str() {
        "api" => Ok(Arc::new(ApiEmbedder::new(cfg)?)),
        _ => Ok(Arc::new(StubEmbedder::from_config(cfg))),
    }
}
