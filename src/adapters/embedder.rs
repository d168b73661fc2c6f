//! The embedder capability: text in, dense vectors out.
//!
//! Two implementations ship. [`HashEmbedder`] is deterministic and
//! dependency-free — the crate's default so tests, examples, and any build
//! without model downloads still produce stable vectors. [`FastEmbedEmbedder`]
//! (behind the `local-embeddings` feature) wraps `fastembed`'s ONNX models,
//! adapted from the teacher's `rag/embeddings.rs::EmbeddingService`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use crate::error::Result;
use crate::telemetry::{Telemetry, TelemetrySink};

/// Output of a single embedding call.
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    pub vector: Vec<f32>,
    pub model: String,
    pub dimensions: usize,
    pub token_count: usize,
}

/// Converts text to dense vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbeddingResult>;

    /// Default batches by calling `embed` sequentially; implementations
    /// backed by a batching-capable provider should override this.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Calls `embedder.embed`, wrapped in an `embedder.embed` span (§6).
pub async fn instrumented_embed(telemetry: &dyn TelemetrySink, embedder: &dyn Embedder, text: &str) -> Result<EmbeddingResult> {
    let t = Telemetry::new(telemetry);
    let model = embedder.model_name().to_string();
    let text_length = text.len().to_string();
    let dimensions = embedder.dimensions().to_string();
    let span = t.start("embedder.embed", &[("model", &model), ("text_length", &text_length), ("dimensions", &dimensions)]);
    match embedder.embed(text).await {
        Ok(result) => {
            let token_count = result.token_count.to_string();
            span.stop(&[("dimensions", &dimensions), ("token_count", &token_count)]);
            Ok(result)
        }
        Err(error) => {
            span.exception(&error.to_string());
            Err(error)
        }
    }
}

/// Deterministic, hash-based embedder. Not semantically meaningful — two
/// unrelated strings that happen to share n-grams will score closer than
/// chance would suggest — but stable across runs and platforms, which is
/// what the default needs to be for tests and examples.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        if text.is_empty() {
            return vector;
        }
        // Hash every trigram into a bucket, matching the classic
        // feature-hashing trick used for bag-of-words embeddings.
        let chars: Vec<char> = text.to_lowercase().chars().collect();
        let window = 3.min(chars.len()).max(1);
        for i in 0..=chars.len().saturating_sub(window) {
            let gram: String = chars[i..i + window].iter().collect();
            let mut hasher = DefaultHasher::new();
            gram.hash(&mut hasher);
            let h = hasher.finish();
            let bucket = (h as usize) % self.dimensions;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingResult> {
        Ok(EmbeddingResult {
            vector: self.hash_to_vector(text),
            model: self.model_name().to_string(),
            dimensions: self.dimensions,
            token_count: crate::types::estimate_tokens(text),
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "hash-embedder"
    }
}

#[cfg(feature = "local-embeddings")]
pub mod fastembed_adapter {
    //! `fastembed`-backed embedder, adapted from the teacher's
    //! `rag/embeddings.rs::EmbeddingService`. Model downloads happen lazily
    //! on first use; `spawn_blocking` keeps the ONNX runtime off the async
    //! executor.

    use super::*;
    use crate::error::RagError;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    /// Supported local embedding models. A deliberately small subset of
    /// `fastembed`'s catalog, covering the common English/multilingual and
    /// size/quality tradeoffs the teacher's larger enum also exposed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum EmbeddingModelType {
        BgeSmallEnV15,
        BgeBaseEnV15,
        AllMiniLmL6V2,
        MultilingualE5Base,
    }

    impl EmbeddingModelType {
        fn to_fastembed_model(self) -> EmbeddingModel {
            match self {
                Self::BgeSmallEnV15 => EmbeddingModel::BGESmallENV15,
                Self::BgeBaseEnV15 => EmbeddingModel::BGEBaseENV15,
                Self::AllMiniLmL6V2 => EmbeddingModel::AllMiniLML6V2,
                Self::MultilingualE5Base => EmbeddingModel::MultilingualE5Base,
            }
        }

        pub fn dimensions(self) -> usize {
            match self {
                Self::BgeSmallEnV15 => 384,
                Self::BgeBaseEnV15 => 768,
                Self::AllMiniLmL6V2 => 384,
                Self::MultilingualE5Base => 768,
            }
        }

        fn name(self) -> &'static str {
            match self {
                Self::BgeSmallEnV15 => "bge-small-en-v1.5",
                Self::BgeBaseEnV15 => "bge-base-en-v1.5",
                Self::AllMiniLmL6V2 => "all-MiniLM-L6-v2",
                Self::MultilingualE5Base => "multilingual-e5-base",
            }
        }
    }

    impl Default for EmbeddingModelType {
        fn default() -> Self {
            Self::BgeSmallEnV15
        }
    }

    pub struct FastEmbedEmbedder {
        model_type: EmbeddingModelType,
        model: Mutex<TextEmbedding>,
    }

    impl FastEmbedEmbedder {
        pub fn new(model_type: EmbeddingModelType) -> Result<Self> {
            let options = InitOptions::new(model_type.to_fastembed_model()).with_show_download_progress(true);
            let model = TextEmbedding::try_new(options)
                .map_err(|e| RagError::ProviderError(format!("fastembed init failed: {e}")))?;
            Ok(Self {
                model_type,
                model: Mutex::new(model),
            })
        }
    }

    #[async_trait]
    impl Embedder for FastEmbedEmbedder {
        async fn embed(&self, text: &str) -> Result<EmbeddingResult> {
            let results = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
            results
                .into_iter()
                .next()
                .ok_or_else(|| RagError::ProviderError("fastembed returned no vectors".into()))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>> {
            let texts = texts.to_vec();
            let model_type = self.model_type;
            // TextEmbedding is not thread-safe to call concurrently from
            // multiple blocking threads; take the lock inside the blocking
            // closure so we hold it only for the duration of the call.
            let model = &self.model;
            let embeddings = tokio::task::block_in_place(|| {
                let guard = model
                    .lock()
                    .map_err(|_| RagError::Internal("fastembed model lock poisoned".into()))?;
                guard
                    .embed(texts.clone(), None)
                    .map_err(|e| RagError::ProviderError(format!("fastembed embed failed: {e}")))
            })?;

            Ok(embeddings
                .into_iter()
                .zip(texts.iter())
                .map(|(vector, text)| EmbeddingResult {
                    dimensions: vector.len(),
                    model: model_type.name().to_string(),
                    token_count: crate::types::estimate_tokens(text),
                    vector,
                })
                .collect())
        }

        fn dimensions(&self) -> usize {
            self.model_type.dimensions()
        }

        fn model_name(&self) -> &str {
            self.model_type.name()
        }
    }
}

#[cfg(feature = "local-embeddings")]
pub use fastembed_adapter::{EmbeddingModelType, FastEmbedEmbedder};

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(32);
        let a = embedder.embed("hello world").await.unwrap();
        let b = embedder.embed("hello world").await.unwrap();
        assert_eq!(a.vector, b.vector);
    }

    #[tokio::test]
    async fn hash_embedder_respects_dimensions() {
        let embedder = HashEmbedder::new(16);
        let result = embedder.embed("some text").await.unwrap();
        assert_eq!(result.vector.len(), 16);
        assert_eq!(result.dimensions, 16);
    }

    #[tokio::test]
    async fn hash_embedder_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(8);
        let result = embedder.embed("").await.unwrap();
        assert!(result.vector.iter().all(|x| *x == 0.0));
        assert_eq!(result.token_count, 0);
    }

    #[tokio::test]
    async fn embed_batch_default_matches_sequential_embed() {
        let embedder = HashEmbedder::new(8);
        let texts = vec!["a".to_string(), "b".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        let single_a = embedder.embed("a").await.unwrap();
        assert_eq!(batch[0].vector, single_a.vector);
    }

    #[tokio::test]
    async fn instrumented_embed_passes_through_the_result() {
        use crate::telemetry::NullTelemetrySink;
        let embedder = HashEmbedder::new(8);
        let result = instrumented_embed(&NullTelemetrySink, &embedder, "hello").await.unwrap();
        assert_eq!(result.dimensions, 8);
    }
}
