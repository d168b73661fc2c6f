//! The vector store capability: dense-vector collections plus a
//! fulltext-search hook used by the hybrid retriever.
//!
//! The teacher ships concrete `VectorStore` implementations behind a
//! `VectorStoreProvider` enum gated by cargo features (`db/vectorstore.rs`).
//! This crate keeps that shape with one default, always-on backend: the
//! in-process, pure-Rust vector index (`ragforge-vector`, descended from the
//! teacher's own `ares-vector` workspace member). Other backends stay out of
//! scope per the expanded specification's external-interfaces note; an
//! `InMemoryVectorStore` ships for tests that don't want the `ragforge-vector`
//! feature at all.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{RagError, Result};
use crate::telemetry::{Telemetry, TelemetrySink};
use crate::types::{ResultSource, RetrievalResult};

/// Distance metric used by a collection. Mirrors `ragforge_vector::DistanceMetric`
/// so callers who only depend on this crate's public surface don't need the
/// `ragforge-vector` feature enabled just to name a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclidean,
    DotProduct,
}

#[cfg(feature = "ragforge-vector")]
impl From<DistanceMetric> for ragforge_vector::DistanceMetric {
    fn from(m: DistanceMetric) -> Self {
        match m {
            DistanceMetric::Cosine => ragforge_vector::DistanceMetric::Cosine,
            DistanceMetric::Euclidean => ragforge_vector::DistanceMetric::Euclidean,
            DistanceMetric::DotProduct => ragforge_vector::DistanceMetric::DotProduct,
        }
    }
}

/// Point-in-time statistics for an index.
#[derive(Debug, Clone)]
pub struct IndexStats {
    pub vector_count: usize,
    pub dimensions: usize,
    pub memory_bytes: usize,
}

/// One item in a `store_batch` call.
#[derive(Debug, Clone)]
pub struct VectorItem {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Search-time options shared by dense and fulltext search.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub min_score: Option<f32>,
}

/// Dense-vector storage plus an optional fulltext capability, keyed by a
/// named index (a collection name). `create_index` is idempotent at the
/// dimensionality level: re-creating an existing index with the same
/// dimensions succeeds as a no-op; a different dimension count fails with
/// [`RagError::DimensionMismatch`].
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn create_index(&self, id: &str, dimensions: usize, metric: DistanceMetric) -> Result<()>;
    async fn delete_index(&self, id: &str) -> Result<()>;
    async fn index_exists(&self, id: &str) -> Result<bool>;
    async fn index_stats(&self, id: &str) -> Result<IndexStats>;

    async fn store(&self, id: &str, item: VectorItem) -> Result<()>;
    async fn store_batch(&self, id: &str, items: Vec<VectorItem>) -> Result<usize>;

    async fn search(
        &self,
        id: &str,
        vector: &[f32],
        k: usize,
        opts: SearchOptions,
    ) -> Result<Vec<RetrievalResult>>;

    /// Fulltext search against the same index. Implementations that have no
    /// fulltext capability return `Ok(vec![])`.
    async fn fulltext_search(&self, _id: &str, _query: &str, _k: usize) -> Result<Vec<RetrievalResult>> {
        Ok(Vec::new())
    }

    async fn delete(&self, id: &str, vector_id: &str) -> Result<bool>;
    async fn restore(&self, id: &str, vector_id: &str) -> Result<bool>;
}

/// Calls `store.search`, wrapped in a `vector_store.search` span (§6).
pub async fn instrumented_search(
    telemetry: &dyn TelemetrySink,
    store: &dyn VectorStore,
    id: &str,
    vector: &[f32],
    k: usize,
    opts: SearchOptions,
) -> Result<Vec<RetrievalResult>> {
    let t = Telemetry::new(telemetry);
    let limit = k.to_string();
    let span = t.start("vector_store.search", &[("backend", "vector_store"), ("mode", "vector"), ("limit", &limit)]);
    match store.search(id, vector, k, opts).await {
        Ok(results) => {
            let result_count = results.len().to_string();
            span.stop(&[("result_count", &result_count), ("success", "true")]);
            Ok(results)
        }
        Err(error) => {
            span.exception(&error.to_string());
            Err(error)
        }
    }
}

/// Calls `store.store_batch`, wrapped in a `vector_store.insert_batch` span (§6).
pub async fn instrumented_store_batch(telemetry: &dyn TelemetrySink, store: &dyn VectorStore, id: &str, items: Vec<VectorItem>) -> Result<usize> {
    let t = Telemetry::new(telemetry);
    let count = items.len().to_string();
    let span = t.start("vector_store.insert_batch", &[("backend", "vector_store"), ("count", &count)]);
    match store.store_batch(id, items).await {
        Ok(written) => {
            let written_count = written.to_string();
            span.stop(&[("count", &written_count), ("success", "true")]);
            Ok(written)
        }
        Err(error) => {
            span.exception(&error.to_string());
            Err(error)
        }
    }
}

/// Plain in-memory `VectorStore`, brute-force cosine search. No external
/// crate dependency; used in tests and as the store for callers who build
/// without the `ragforge-vector` feature.
#[derive(Default)]
pub struct InMemoryVectorStore {
    indexes: RwLock<HashMap<String, InMemoryIndex>>,
}

struct InMemoryIndex {
    dimensions: usize,
    vectors: HashMap<String, (Vec<f32>, HashMap<String, serde_json::Value>)>,
    deleted: std::collections::HashSet<String>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_index(&self, id: &str, dimensions: usize, _metric: DistanceMetric) -> Result<()> {
        let mut indexes = self.indexes.write();
        if let Some(existing) = indexes.get(id) {
            if existing.dimensions == dimensions {
                return Ok(());
            }
            return Err(RagError::DimensionMismatch {
                expected: existing.dimensions,
                actual: dimensions,
            });
        }
        indexes.insert(
            id.to_string(),
            InMemoryIndex {
                dimensions,
                vectors: HashMap::new(),
                deleted: std::collections::HashSet::new(),
            },
        );
        Ok(())
    }

    async fn delete_index(&self, id: &str) -> Result<()> {
        self.indexes.write().remove(id);
        Ok(())
    }

    async fn index_exists(&self, id: &str) -> Result<bool> {
        Ok(self.indexes.read().contains_key(id))
    }

    async fn index_stats(&self, id: &str) -> Result<IndexStats> {
        let indexes = self.indexes.read();
        let index = indexes.get(id).ok_or_else(|| RagError::NotFound(id.to_string()))?;
        Ok(IndexStats {
            vector_count: index.vectors.len() - index.deleted.len(),
            dimensions: index.dimensions,
            memory_bytes: index.vectors.len() * index.dimensions * std::mem::size_of::<f32>(),
        })
    }

    async fn store(&self, id: &str, item: VectorItem) -> Result<()> {
        let mut indexes = self.indexes.write();
        let index = indexes.get_mut(id).ok_or_else(|| RagError::NotFound(id.to_string()))?;
        if item.vector.len() != index.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: index.dimensions,
                actual: item.vector.len(),
            });
        }
        index.deleted.remove(&item.id);
        index.vectors.insert(item.id, (item.vector, item.metadata));
        Ok(())
    }

    async fn store_batch(&self, id: &str, items: Vec<VectorItem>) -> Result<usize> {
        let count = items.len();
        for item in items {
            self.store(id, item).await?;
        }
        Ok(count)
    }

    async fn search(
        &self,
        id: &str,
        vector: &[f32],
        k: usize,
        opts: SearchOptions,
    ) -> Result<Vec<RetrievalResult>> {
        let indexes = self.indexes.read();
        let index = indexes.get(id).ok_or_else(|| RagError::NotFound(id.to_string()))?;
        let mut scored: Vec<RetrievalResult> = index
            .vectors
            .iter()
            .filter(|(vid, _)| !index.deleted.contains(*vid))
            .map(|(vid, (v, metadata))| RetrievalResult {
                id: vid.clone(),
                content: None,
                score: cosine(vector, v),
                metadata: metadata.clone(),
                source: ResultSource::Vector,
            })
            .filter(|r| opts.min_score.map(|min| r.score >= min).unwrap_or(true))
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete(&self, id: &str, vector_id: &str) -> Result<bool> {
        let mut indexes = self.indexes.write();
        let index = indexes.get_mut(id).ok_or_else(|| RagError::NotFound(id.to_string()))?;
        if !index.vectors.contains_key(vector_id) {
            return Ok(false);
        }
        Ok(index.deleted.insert(vector_id.to_string()))
    }

    async fn restore(&self, id: &str, vector_id: &str) -> Result<bool> {
        let mut indexes = self.indexes.write();
        let index = indexes.get_mut(id).ok_or_else(|| RagError::NotFound(id.to_string()))?;
        Ok(index.deleted.remove(vector_id))
    }
}

/// Adapter over the `ragforge-vector` crate, the default backend.
#[cfg(feature = "ragforge-vector")]
pub mod ragforge_backend {
    use super::*;
    use ragforge_vector::{Config as VecConfig, VectorDb, VectorMetadata};

    pub struct RagforgeVectorStore {
        db: VectorDb,
    }

    impl RagforgeVectorStore {
        pub async fn open(data_path: Option<std::path::PathBuf>) -> Result<Self> {
            let config = match data_path {
                Some(path) => VecConfig {
                    data_path: Some(path),
                    ..VecConfig::default()
                },
                None => VecConfig::memory(),
            };
            let db = VectorDb::open(config)
                .await
                .map_err(|e| RagError::Database(e.to_string()))?;
            Ok(Self { db })
        }

        fn metadata_to_json(metadata: Option<VectorMetadata>) -> HashMap<String, serde_json::Value> {
            metadata
                .map(|m| {
                    m.data
                        .into_iter()
                        .map(|(k, v)| (k, serde_json::to_value(format!("{v:?}")).unwrap_or_default()))
                        .collect()
                })
                .unwrap_or_default()
        }

        fn json_to_metadata(fields: HashMap<String, serde_json::Value>) -> VectorMetadata {
            VectorMetadata::from_pairs(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, v.as_str().unwrap_or_default().to_string())),
            )
        }
    }

    #[async_trait]
    impl VectorStore for RagforgeVectorStore {
        async fn create_index(&self, id: &str, dimensions: usize, metric: DistanceMetric) -> Result<()> {
            self.db
                .create_collection(id, dimensions, metric.into())
                .await
                .map_err(|e| match e {
                    ragforge_vector::Error::DimensionMismatch { expected, actual } => {
                        RagError::DimensionMismatch { expected, actual }
                    }
                    other => RagError::Database(other.to_string()),
                })
        }

        async fn delete_index(&self, id: &str) -> Result<()> {
            self.db
                .delete_collection(id)
                .await
                .map_err(|e| RagError::Database(e.to_string()))
        }

        async fn index_exists(&self, id: &str) -> Result<bool> {
            Ok(self.db.collection_exists(id))
        }

        async fn index_stats(&self, id: &str) -> Result<IndexStats> {
            let stats = self
                .db
                .collection_stats(id)
                .map_err(|e| RagError::Database(e.to_string()))?;
            Ok(IndexStats {
                vector_count: stats.vector_count,
                dimensions: stats.dimensions,
                memory_bytes: stats.memory_bytes,
            })
        }

        async fn store(&self, id: &str, item: VectorItem) -> Result<()> {
            self.db
                .insert(id, &item.id, &item.vector, Some(Self::json_to_metadata(item.metadata)))
                .await
                .map_err(|e| RagError::Database(e.to_string()))
        }

        async fn store_batch(&self, id: &str, items: Vec<VectorItem>) -> Result<usize> {
            let owned: Vec<(String, Vec<f32>, Option<VectorMetadata>)> = items
                .into_iter()
                .map(|item| (item.id, item.vector, Some(Self::json_to_metadata(item.metadata))))
                .collect();
            let refs: Vec<(&str, &[f32], Option<VectorMetadata>)> = owned
                .iter()
                .map(|(id, vector, metadata)| (id.as_str(), vector.as_slice(), metadata.clone()))
                .collect();
            self.db
                .insert_batch(id, refs)
                .await
                .map_err(|e| RagError::Database(e.to_string()))
        }

        async fn search(
            &self,
            id: &str,
            vector: &[f32],
            k: usize,
            opts: SearchOptions,
        ) -> Result<Vec<RetrievalResult>> {
            let results = match opts.min_score {
                Some(min) => self
                    .db
                    .search_with_threshold(id, vector, k, min)
                    .await
                    .map_err(|e| RagError::Database(e.to_string()))?,
                None => self
                    .db
                    .search(id, vector, k)
                    .await
                    .map_err(|e| RagError::Database(e.to_string()))?,
            };
            Ok(results
                .into_iter()
                .map(|r| RetrievalResult {
                    id: r.id,
                    content: None,
                    score: r.score,
                    metadata: Self::metadata_to_json(r.metadata),
                    source: ResultSource::Vector,
                })
                .collect())
        }

        async fn delete(&self, id: &str, vector_id: &str) -> Result<bool> {
            self.db
                .delete(id, vector_id)
                .await
                .map_err(|e| RagError::Database(e.to_string()))
        }

        async fn restore(&self, id: &str, vector_id: &str) -> Result<bool> {
            self.db
                .restore(id, vector_id)
                .await
                .map_err(|e| RagError::Database(e.to_string()))
        }
    }
}

#[cfg(feature = "ragforge-vector")]
pub use ragforge_backend::RagforgeVectorStore;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_index_is_idempotent_for_same_dimensions() {
        let store = InMemoryVectorStore::new();
        store.create_index("docs", 3, DistanceMetric::Cosine).await.unwrap();
        store.create_index("docs", 3, DistanceMetric::Cosine).await.unwrap();
    }

    #[tokio::test]
    async fn create_index_rejects_dimension_change() {
        let store = InMemoryVectorStore::new();
        store.create_index("docs", 3, DistanceMetric::Cosine).await.unwrap();
        let err = store.create_index("docs", 4, DistanceMetric::Cosine).await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 4 }));
    }

    #[tokio::test]
    async fn round_trip_vector_search() {
        let store = InMemoryVectorStore::new();
        store.create_index("docs", 3, DistanceMetric::Cosine).await.unwrap();
        store
            .store(
                "docs",
                VectorItem {
                    id: "a".into(),
                    vector: vec![1.0, 0.0, 0.0],
                    metadata: HashMap::new(),
                },
            )
            .await
            .unwrap();
        store
            .store(
                "docs",
                VectorItem {
                    id: "b".into(),
                    vector: vec![0.0, 1.0, 0.0],
                    metadata: HashMap::new(),
                },
            )
            .await
            .unwrap();
        store
            .store(
                "docs",
                VectorItem {
                    id: "c".into(),
                    vector: vec![std::f32::consts::FRAC_1_SQRT_2, std::f32::consts::FRAC_1_SQRT_2, 0.0],
                    metadata: HashMap::new(),
                },
            )
            .await
            .unwrap();

        let results = store
            .search("docs", &[1.0, 0.0, 0.0], 2, SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert_eq!(results[1].id, "c");
        assert!((results[1].score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn soft_delete_then_restore_round_trips() {
        let store = InMemoryVectorStore::new();
        store.create_index("docs", 2, DistanceMetric::Cosine).await.unwrap();
        store
            .store(
                "docs",
                VectorItem {
                    id: "a".into(),
                    vector: vec![1.0, 0.0],
                    metadata: HashMap::new(),
                },
            )
            .await
            .unwrap();

        assert!(store.delete("docs", "a").await.unwrap());
        let results = store
            .search("docs", &[1.0, 0.0], 10, SearchOptions::default())
            .await
            .unwrap();
        assert!(results.is_empty());

        assert!(store.restore("docs", "a").await.unwrap());
        let results = store
            .search("docs", &[1.0, 0.0], 10, SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn instrumented_helpers_pass_through_results() {
        use crate::telemetry::NullTelemetrySink;
        let store = InMemoryVectorStore::new();
        store.create_index("docs", 2, DistanceMetric::Cosine).await.unwrap();

        let written = instrumented_store_batch(
            &NullTelemetrySink,
            &store,
            "docs",
            vec![VectorItem {
                id: "a".into(),
                vector: vec![1.0, 0.0],
                metadata: HashMap::new(),
            }],
        )
        .await
        .unwrap();
        assert_eq!(written, 1);

        let results = instrumented_search(&NullTelemetrySink, &store, "docs", &[1.0, 0.0], 10, SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }
}
