/// Embedding backends and the dual-domain wrapper.
///
/// Chunks are embedded twice, once per domain: TEXT (docstring-flavored
/// input) and CODE (raw source). Both slots share the `Embedder` trait;
/// the dual wrapper adds the per-chunk timeout.
pub mod dual;
pub mod mock;
pub mod onnx;
pub mod tokenizer;

use thiserror::Error;

pub use dual::{DualEmbedder, EmbeddingDomain};
pub use mock::{FailingEmbedder, MockEmbedder};
pub use onnx::OnnxEmbedder;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    /// The per-chunk deadline elapsed. Recoverable: the chunk is kept
    /// without a vector and the miss is logged, never fatal to the run.
    #[error("embedding timed out after {0}s")]
    Timeout(u64),
}

/// Trait for embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;
}
