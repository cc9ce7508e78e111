//! Embedding backends for the quarry engine.
//!
//! [`EmbeddingBackend`] is the seam the indexer embeds through; the built-in
//! [`HttpEmbedding`] talks to any OpenAI-compatible `/embeddings` endpoint.
//! Short model names from `config.yaml` resolve through [`resolve_model`].

mod http;
mod models;

pub use http::{HttpEmbedding, BATCH_SIZE};
pub use models::{default_dimensions, resolve_model};

use quarry_core::Result;

/// A dense embedding provider.
///
/// Backends batch internally; callers hand over unit text in bulk and get
/// vectors back in input order. `dim()` is only authoritative after a
/// successful `load()`.
pub trait EmbeddingBackend {
    /// Prepare the backend and pin down its output dimensionality.
    ///
    /// # Errors
    ///
    /// Returns [`quarry_core::QuarryError::Embedding`] when the model or
    /// endpoint is unavailable.
    fn load(&mut self) -> Result<()>;

    /// Embed document texts, preserving order.
    ///
    /// # Errors
    ///
    /// Returns [`quarry_core::QuarryError::Embedding`] on failure; partial
    /// output is never returned.
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single search query.
    ///
    /// # Errors
    ///
    /// Returns [`quarry_core::QuarryError::Embedding`] on failure.
    fn encode_query(&self, query: &str) -> Result<Vec<f32>>;

    /// Output vector dimensionality.
    fn dim(&self) -> usize;

    /// Human-readable backend identifier for logs.
    fn name(&self) -> &str;
}
