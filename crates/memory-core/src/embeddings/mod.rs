// src/embeddings/mod.rs
// `Embeddings`: the capability the core consumes to turn content into
// vectors for semantic search (§1, §4.4). Like `Chunking` and `VectorStore`,
// this is a trait object boundary — the core never talks to an HTTP client
// directly.

mod openai;

pub use openai::OpenAiEmbeddings;

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait Embeddings: Send + Sync {
    /// Embed one piece of text. Implementations truncate to their provider's
    /// limit rather than erroring on long input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts; implementations are free to batch/parallelize.
    /// The default just calls `embed` sequentially.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Fixed output dimensionality this provider produces.
    fn dimensions(&self) -> usize;
}

/// No-op provider for deployments without an embeddings API key configured
/// (§4.15 — `has_embeddings()` is false). Search falls back to keyword
/// overlap in this mode; `embed` is never expected to be called, so it
/// errors loudly rather than returning a meaningless zero vector.
pub struct NoopEmbeddings {
    dimensions: usize,
}

impl NoopEmbeddings {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl Embeddings for NoopEmbeddings {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(crate::error::MemoryError::Validation(
            "no embeddings provider configured; set EMBEDDINGS_API_KEY".to_string(),
        ))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
