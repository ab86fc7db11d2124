/// Dual-domain embedding with a per-chunk deadline.
///
/// Two independent models serve the TEXT and CODE domains. Inference runs
/// on the blocking pool inside this process; a chunk that blows the
/// deadline yields `EmbedderError::Timeout` and the pipeline moves on.
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::{Embedder, EmbedderError, MockEmbedder};

/// Which embedding space a vector belongs to. The two spaces are never
/// mixed: TEXT queries search TEXT vectors, CODE queries search CODE
/// vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbeddingDomain {
    Text,
    Code,
}

impl EmbeddingDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingDomain::Text => "text",
            EmbeddingDomain::Code => "code",
        }
    }
}

pub struct DualEmbedder {
    text: Arc<dyn Embedder>,
    code: Arc<dyn Embedder>,
    timeout: Duration,
}

impl DualEmbedder {
    pub fn new(text: Arc<dyn Embedder>, code: Arc<dyn Embedder>, timeout: Duration) -> Self {
        Self {
            text,
            code,
            timeout,
        }
    }

    /// Hash-based embedders for both domains, salted apart.
    pub fn mock(dimensions: usize) -> Self {
        Self::new(
            Arc::new(MockEmbedder::with_salt(dimensions, 1)),
            Arc::new(MockEmbedder::with_salt(dimensions, 2)),
            Duration::from_secs(30),
        )
    }

    pub fn dimensions(&self) -> usize {
        self.text.dimensions()
    }

    /// Embed one input in the given domain, bounded by the deadline.
    pub async fn embed_domain(
        &self,
        domain: EmbeddingDomain,
        input: String,
    ) -> Result<Vec<f32>, EmbedderError> {
        let embedder = match domain {
            EmbeddingDomain::Text => Arc::clone(&self.text),
            EmbeddingDomain::Code => Arc::clone(&self.code),
        };

        let task = tokio::task::spawn_blocking(move || embedder.embed(&input));
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(EmbedderError::InferenceFailed(format!(
                "embedding task failed: {join_err}"
            ))),
            Err(_elapsed) => {
                debug!(domain = domain.as_str(), "embedding deadline elapsed");
                Err(EmbedderError::Timeout(self.timeout.as_secs()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowEmbedder;

    impl Embedder for SlowEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedderError> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(vec![0.0; 8])
        }

        fn dimensions(&self) -> usize {
            8
        }
    }

    #[tokio::test]
    async fn test_domains_are_distinct_spaces() {
        let dual = DualEmbedder::mock(64);
        let text = dual
            .embed_domain(EmbeddingDomain::Text, "fn main() {}".to_string())
            .await
            .unwrap();
        let code = dual
            .embed_domain(EmbeddingDomain::Code, "fn main() {}".to_string())
            .await
            .unwrap();
        assert_eq!(text.len(), 64);
        assert_ne!(text, code);
    }

    #[tokio::test]
    async fn test_timeout_is_recoverable_error() {
        let dual = DualEmbedder::new(
            Arc::new(SlowEmbedder),
            Arc::new(SlowEmbedder),
            Duration::from_millis(20),
        );
        let result = dual
            .embed_domain(EmbeddingDomain::Code, "anything".to_string())
            .await;
        assert!(matches!(result, Err(EmbedderError::Timeout(_))));
    }
}
