mod fastembed_manager;
mod hashed;

pub use fastembed_manager::FastEmbedManager;
pub use hashed::HashEmbedder;

use anyhow::Result;

/// Trait for embedding generation. Calls block; async callers go through
/// `spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of text
    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Get the dimension of the embeddings
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}
