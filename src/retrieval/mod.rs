//! Retriever composer: dense, full-text, hybrid, and graph retrieval over
//! the registered [`VectorStore`]/[`GraphStore`] adapters, merged by id
//! keeping the maximum score. Grounded in the teacher's `rag/search.rs`
//! (`SearchEngine::search_hybrid`'s parallel-then-fuse shape), generalized
//! to the capability-trait seams the rest of this crate uses instead of the
//! teacher's concrete `Bm25Index`/`FuzzyIndex` fields.

pub mod fulltext;

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::embedder::{instrumented_embed, Embedder};
use crate::adapters::graph_store::GraphStore;
use crate::adapters::vector_store::{instrumented_search, DistanceMetric, SearchOptions, VectorStore};
use crate::error::Result;
use crate::telemetry::{NullTelemetrySink, Telemetry, TelemetrySink};
use crate::types::{ResultSource, RetrievalResult};

/// Graph retrieval sub-mode (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphMode {
    /// Entity-vector search, then BFS outward, ranked by BFS distance then
    /// cosine score.
    Local,
    /// Community-summary vector search.
    Global,
    /// Local and global concatenated, keeping the higher per-id score on
    /// duplicates.
    Hybrid,
}

/// Which retriever(s) to run for one `retrieve` call.
#[derive(Debug, Clone)]
pub enum RetrievalMode {
    Dense {
        index: String,
        metric: DistanceMetric,
    },
    Fulltext {
        index: String,
    },
    /// Runs dense and fulltext concurrently, combining scores as
    /// `alpha * vector + (1 - alpha) * fulltext` (default `alpha = 0.5`).
    Hybrid {
        index: String,
        metric: DistanceMetric,
        alpha: f32,
    },
    Graph {
        graph: String,
        mode: GraphMode,
        depth: usize,
    },
}

#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub k: usize,
    pub min_score: Option<f32>,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self { k: 10, min_score: None }
    }
}

/// Executes one or more retrieval modes and merges their outputs by id,
/// keeping the maximum score per id.
pub struct RetrieverComposer {
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    graph_store: Option<Arc<dyn GraphStore>>,
    fulltext: fulltext::FulltextIndex,
    telemetry: Arc<dyn TelemetrySink>,
}

impl RetrieverComposer {
    pub fn new(embedder: Arc<dyn Embedder>, vector_store: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            vector_store,
            graph_store: None,
            fulltext: fulltext::FulltextIndex::new(),
            telemetry: Arc::new(NullTelemetrySink),
        }
    }

    pub fn with_graph_store(mut self, graph_store: Arc<dyn GraphStore>) -> Self {
        self.graph_store = Some(graph_store);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Indexes a document's text for the in-process fulltext retriever
    /// (complements whatever fulltext capability `vector_store` itself
    /// offers, if any, via `fulltext_search`).
    pub fn index_fulltext(&mut self, id: &str, content: &str) {
        self.fulltext.add_document(id, content);
    }

    pub async fn retrieve(&self, query: &str, mode: &RetrievalMode, opts: &RetrievalOptions) -> Result<Vec<RetrievalResult>> {
        match mode {
            RetrievalMode::Dense { index, metric: _ } => self.dense(query, index, opts).await,
            RetrievalMode::Fulltext { index: _ } => Ok(self.fulltext_local(query, opts)),
            RetrievalMode::Hybrid { index, metric: _, alpha } => self.hybrid(query, index, *alpha, opts).await,
            RetrievalMode::Graph { graph, mode, depth } => self.graph(query, graph, *mode, *depth, opts).await,
        }
    }

    async fn dense(&self, query: &str, index: &str, opts: &RetrievalOptions) -> Result<Vec<RetrievalResult>> {
        let telemetry = Telemetry::new(self.telemetry.as_ref());
        let k = opts.k.to_string();
        let span = telemetry.start("rag.search", &[("mode", "semantic"), ("k", &k)]);

        let outcome = async {
            let embedding = instrumented_embed(self.telemetry.as_ref(), self.embedder.as_ref(), query).await?;
            let search_opts = SearchOptions { min_score: opts.min_score };
            let mut results = instrumented_search(self.telemetry.as_ref(), self.vector_store.as_ref(), index, &embedding.vector, opts.k, search_opts).await?;
            for r in &mut results {
                r.source = ResultSource::Vector;
            }
            Ok(results)
        }
        .await;

        match outcome {
            Ok(results) => {
                let result_count = results.len().to_string();
                span.stop(&[("result_count", &result_count)]);
                Ok(results)
            }
            Err(error) => {
                span.exception(&error.to_string());
                Err(error)
            }
        }
    }

    fn fulltext_local(&self, query: &str, opts: &RetrievalOptions) -> Vec<RetrievalResult> {
        self.fulltext
            .search(query, opts.k)
            .into_iter()
            .map(|(id, score)| RetrievalResult {
                id,
                content: None,
                score,
                metadata: HashMap::new(),
                source: ResultSource::Fulltext,
            })
            .collect()
    }

    async fn hybrid(&self, query: &str, index: &str, alpha: f32, opts: &RetrievalOptions) -> Result<Vec<RetrievalResult>> {
        let wide_opts = RetrievalOptions { k: opts.k * 4, min_score: None };
        let (dense, fulltext) = tokio::try_join!(self.dense(query, index, &wide_opts), async {
            Ok(self.fulltext_local(query, &wide_opts))
        })?;

        let mut combined: HashMap<String, RetrievalResult> = HashMap::new();
        for r in dense {
            combined
                .entry(r.id.clone())
                .and_modify(|existing| existing.score += alpha * r.score)
                .or_insert_with(|| RetrievalResult {
                    score: alpha * r.score,
                    source: ResultSource::Hybrid,
                    ..r
                });
        }
        for r in fulltext {
            combined
                .entry(r.id.clone())
                .and_modify(|existing| existing.score += (1.0 - alpha) * r.score)
                .or_insert_with(|| RetrievalResult {
                    score: (1.0 - alpha) * r.score,
                    source: ResultSource::Hybrid,
                    ..r
                });
        }

        let mut merged: Vec<RetrievalResult> = combined.into_values().collect();
        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(min_score) = opts.min_score {
            merged.retain(|r| r.score >= min_score);
        }
        merged.truncate(opts.k);
        Ok(merged)
    }

    async fn graph(&self, query: &str, graph: &str, mode: GraphMode, depth: usize, opts: &RetrievalOptions) -> Result<Vec<RetrievalResult>> {
        let store = self
            .graph_store
            .as_ref()
            .ok_or_else(|| crate::error::RagError::NoAdapter("graph_store".to_string()))?;
        let embedding = self.embedder.embed(query).await?;

        match mode {
            GraphMode::Local => {
                let entity_hits = store.search_entities_by_vector(graph, &embedding.vector, opts.k).await?;
                let mut results = Vec::new();
                for hit in entity_hits {
                    results.push(RetrievalResult {
                        id: hit.id.clone(),
                        content: None,
                        score: hit.score,
                        metadata: HashMap::new(),
                        source: ResultSource::GraphLocal,
                    });
                    let neighbors = store.bfs(graph, &hit.id, depth).await?;
                    for (distance, entity) in neighbors.iter().enumerate() {
                        // Ranked by BFS distance then cosine score: distance
                        // dominates via a decaying multiplier on the entity
                        // vector's similarity to the query.
                        let proximity_score = hit.score / (distance as f32 + 2.0);
                        results.push(RetrievalResult {
                            id: entity.id.clone(),
                            content: entity.description.clone(),
                            score: proximity_score,
                            metadata: HashMap::new(),
                            source: ResultSource::GraphLocal,
                        });
                    }
                }
                results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
                results.truncate(opts.k);
                Ok(results)
            }
            GraphMode::Global => {
                let hits = store.search_communities_by_vector(graph, &embedding.vector, opts.k).await?;
                Ok(hits
                    .into_iter()
                    .map(|hit| RetrievalResult {
                        id: hit.id,
                        content: None,
                        score: hit.score,
                        metadata: HashMap::new(),
                        source: ResultSource::GraphGlobal,
                    })
                    .collect())
            }
            GraphMode::Hybrid => {
                let local = Box::pin(self.graph(query, graph, GraphMode::Local, depth, opts)).await?;
                let global = Box::pin(self.graph(query, graph, GraphMode::Global, depth, opts)).await?;
                Ok(dedup_keep_max(local.into_iter().chain(global)))
            }
        }
    }
}

/// Deduplicates by `id`, keeping the highest-scoring duplicate.
pub fn dedup_keep_max(results: impl IntoIterator<Item = RetrievalResult>) -> Vec<RetrievalResult> {
    let mut by_id: HashMap<String, RetrievalResult> = HashMap::new();
    for r in results {
        by_id
            .entry(r.id.clone())
            .and_modify(|existing| {
                if r.score > existing.score {
                    *existing = r.clone();
                }
            })
            .or_insert(r);
    }
    let mut merged: Vec<RetrievalResult> = by_id.into_values().collect();
    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::embedder::HashEmbedder;
    use crate::adapters::vector_store::{InMemoryVectorStore, VectorItem};

    fn result(id: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            id: id.to_string(),
            content: None,
            score,
            metadata: HashMap::new(),
            source: ResultSource::Vector,
        }
    }

    #[test]
    fn dedup_keeps_the_highest_scoring_duplicate() {
        let merged = dedup_keep_max(vec![result("a", 0.5), result("a", 0.9), result("b", 0.3)]);
        let a = merged.iter().find(|r| r.id == "a").unwrap();
        assert!((a.score - 0.9).abs() < 1e-6);
        assert_eq!(merged.len(), 2);
    }

    #[tokio::test]
    async fn dense_retrieval_round_trips_through_vector_store() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        store.create_index("docs", 16, DistanceMetric::Cosine).await.unwrap();
        let embedding = embedder.embed("hello world").await.unwrap();
        store
            .store(
                "docs",
                VectorItem {
                    id: "doc-1".into(),
                    vector: embedding.vector,
                    metadata: HashMap::new(),
                },
            )
            .await
            .unwrap();

        let composer = RetrieverComposer::new(embedder, store);
        let results = composer
            .retrieve(
                "hello world",
                &RetrievalMode::Dense { index: "docs".into(), metric: DistanceMetric::Cosine },
                &RetrievalOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(results[0].id, "doc-1");
    }

    #[tokio::test]
    async fn fulltext_retrieval_uses_the_in_process_index() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        let mut composer = RetrieverComposer::new(embedder, store);
        composer.index_fulltext("doc-1", "rust programming language");
        composer.index_fulltext("doc-2", "python programming language");

        let results = composer
            .retrieve(
                "rust programming",
                &RetrievalMode::Fulltext { index: "docs".into() },
                &RetrievalOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "doc-1");
    }
}
