//! Engine-wide configuration: the tunables the specification calls out as
//! defaults for the chunker, rate limiter, reranker, self-correction loops,
//! GraphRAG, and the ingestion pipeline.
//!
//! Loaded through `config` + `dotenvy` + `toml`, the same crates the teacher
//! uses for `AresConfig`/`AresConfigManager` (`utils/toml_config.rs`).
//! Concrete config *sources* (remote config servers, hot-reload watchers)
//! are out of scope per the purpose-and-scope section; the struct and its
//! defaults are what's in scope here.

use serde::{Deserialize, Serialize};

use crate::adapters::chunker::ChunkerConfig;
use crate::error::{RagError, Result};

/// Token-bucket defaults for the process-wide [`crate::rate_limit::RateLimiter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    #[serde(default = "default_rate_capacity")]
    pub capacity: f64,
    #[serde(default = "default_rate_refill_per_sec")]
    pub refill_per_sec: f64,
}

fn default_rate_capacity() -> f64 {
    10.0
}

fn default_rate_refill_per_sec() -> f64 {
    10.0
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: default_rate_capacity(),
            refill_per_sec: default_rate_refill_per_sec(),
        }
    }
}

/// Defaults for [`crate::adapters::reranker::RerankOptions`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    #[serde(default = "default_rerank_top_n")]
    pub top_n: usize,
    #[serde(default)]
    pub threshold: Option<f32>,
}

fn default_rerank_top_n() -> usize {
    10
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            top_n: default_rerank_top_n(),
            threshold: None,
        }
    }
}

/// Defaults for the self-correcting search and answer loops (§4.6/§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfCorrectConfig {
    #[serde(default = "default_search_max_iterations")]
    pub search_max_iterations: u32,
    #[serde(default = "default_min_results")]
    pub min_results: usize,
    #[serde(default = "default_answer_max_corrections")]
    pub answer_max_corrections: u32,
}

fn default_search_max_iterations() -> u32 {
    3
}

fn default_min_results() -> usize {
    1
}

fn default_answer_max_corrections() -> u32 {
    2
}

impl Default for SelfCorrectConfig {
    fn default() -> Self {
        Self {
            search_max_iterations: default_search_max_iterations(),
            min_results: default_min_results(),
            answer_max_corrections: default_answer_max_corrections(),
        }
    }
}

/// Defaults for entity extraction, resolution, and label-propagation
/// community detection (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphRagConfig {
    #[serde(default = "default_extraction_concurrency")]
    pub extraction_max_concurrency: usize,
    #[serde(default = "default_extraction_rate_limit_ms")]
    pub extraction_rate_limit_ms: u64,
    #[serde(default = "default_resolution_threshold")]
    pub entity_resolution_threshold: f32,
    #[serde(default = "default_detection_max_iterations")]
    pub detection_max_iterations: usize,
    #[serde(default = "default_convergence_threshold")]
    pub detection_convergence_threshold: f32,
}

fn default_extraction_concurrency() -> usize {
    5
}

fn default_extraction_rate_limit_ms() -> u64 {
    100
}

fn default_resolution_threshold() -> f32 {
    0.85
}

fn default_detection_max_iterations() -> usize {
    100
}

fn default_convergence_threshold() -> f32 {
    0.01
}

impl Default for GraphRagConfig {
    fn default() -> Self {
        Self {
            extraction_max_concurrency: default_extraction_concurrency(),
            extraction_rate_limit_ms: default_extraction_rate_limit_ms(),
            entity_resolution_threshold: default_resolution_threshold(),
            detection_max_iterations: default_detection_max_iterations(),
            detection_convergence_threshold: default_convergence_threshold(),
        }
    }
}

/// Defaults for the ingestion pipeline's worker counts and batching (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default = "default_chunk_workers")]
    pub chunk_workers: usize,
    #[serde(default = "default_embed_workers")]
    pub embed_workers: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
}

fn default_chunk_workers() -> usize {
    10
}

fn default_embed_workers() -> usize {
    10
}

fn default_batch_size() -> usize {
    100
}

fn default_batch_timeout_ms() -> u64 {
    2_000
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunk_workers: default_chunk_workers(),
            embed_workers: default_embed_workers(),
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
        }
    }
}

/// Top-level configuration for the RAG engine. Every field carries the
/// default the specification names; callers override by layering a TOML
/// file and environment variables on top.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default)]
    pub chunker: ChunkerConfig,
    #[serde(default)]
    pub rate_limiter: RateLimiterConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub self_correct: SelfCorrectConfig,
    #[serde(default)]
    pub graphrag: GraphRagConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

impl RagConfig {
    /// Loads configuration layering, in increasing priority: compiled-in
    /// defaults, an optional TOML file, then `RAG_`-prefixed environment
    /// variables (`RAG_CHUNKER__CHUNK_SIZE=256`, matching the teacher's
    /// `AresConfigManager` layering order).
    pub fn load(path: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&RagConfig::default()).map_err(|e| RagError::Config(e.to_string()))?);

        if let Some(path) = path {
            if std::path::Path::new(path).exists() {
                builder = builder.add_source(config::File::from(std::path::Path::new(path)));
            }
        }

        let built = builder
            .add_source(config::Environment::with_prefix("RAG").separator("__"))
            .build()
            .map_err(|e| RagError::Config(e.to_string()))?;

        built.try_deserialize().map_err(|e| RagError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_specification_constants() {
        let config = RagConfig::default();
        assert_eq!(config.chunker.chunk_size, 512);
        assert_eq!(config.rate_limiter.capacity, 10.0);
        assert_eq!(config.reranker.top_n, 10);
        assert_eq!(config.self_correct.search_max_iterations, 3);
        assert_eq!(config.self_correct.answer_max_corrections, 2);
        assert_eq!(config.graphrag.extraction_max_concurrency, 5);
        assert_eq!(config.graphrag.entity_resolution_threshold, 0.85);
        assert_eq!(config.graphrag.detection_max_iterations, 100);
        assert_eq!(config.ingestion.batch_size, 100);
        assert_eq!(config.ingestion.batch_timeout_ms, 2_000);
    }

    #[test]
    fn load_without_a_file_falls_back_to_defaults() {
        let config = RagConfig::load(Some("does-not-exist.toml")).unwrap();
        assert_eq!(config.chunker.chunk_size, 512);
    }
}
