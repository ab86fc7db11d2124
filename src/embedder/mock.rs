/// Deterministic embedders for tests and model-less operation.
use std::hash::{DefaultHasher, Hash, Hasher};

use super::{Embedder, EmbedderError};

/// Produces deterministic vectors from text hashes.
///
/// The `salt` keeps the TEXT and CODE slots from producing identical
/// vectors for identical input when both run without a real model.
pub struct MockEmbedder {
    dimensions: usize,
    salt: u64,
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            salt: 0,
        }
    }

    #[must_use]
    pub fn with_salt(dimensions: usize, salt: u64) -> Self {
        Self { dimensions, salt }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut hasher = DefaultHasher::new();
        self.salt.hash(&mut hasher);
        text.hash(&mut hasher);
        let hash = hasher.finish();

        // Hash bytes seed deterministic float values
        let bytes = hash.to_le_bytes();
        let mut embedding = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            embedding.push(bytes[i % 8] as f32 / 255.0);
        }

        // L2 normalize
        let norm_sq: f32 = embedding.iter().map(|v| v * v).sum();
        if norm_sq > 0.0 {
            let inv = 1.0 / norm_sq.sqrt();
            for v in &mut embedding {
                *v *= inv;
            }
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Always fails. Exercises the lexical-only degradation path.
pub struct FailingEmbedder {
    dimensions: usize,
}

impl FailingEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Embedder for FailingEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedderError> {
        Err(EmbedderError::InferenceFailed(
            "embedding backend unavailable".to_string(),
        ))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
