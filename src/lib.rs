//! # ragforge
//!
//! A retrieval-augmented generation indexing and query engine: ingestion,
//! chunking, embedding, hybrid dense/full-text/graph retrieval, reranking,
//! and self-correcting answer generation, built around small adapter traits
//! rather than concrete provider clients.
//!
//! ## Overview
//!
//! `ragforge` can be used in two ways:
//!
//! 1. **As a library** — compose [`adapters`] implementations into an
//!    [`adapters::AdapterRegistry`], then drive ingestion
//!    ([`ingestion::IngestionPipeline`]), retrieval
//!    ([`retrieval::RetrieverComposer`]), and the self-correcting
//!    search/answer loops ([`selfcorrect`]) directly.
//! 2. **As a CLI** — run the `ragforge` binary for maintenance operations
//!    (re-embedding, diagnostics, consistency verification) over an
//!    existing index.
//!
//! ### Basic Example
//!
//! ```rust,ignore
//! use ragforge::adapters::embedder::HashEmbedder;
//! use ragforge::adapters::vector_store::{DistanceMetric, InMemoryVectorStore, VectorStore};
//! use ragforge::retrieval::{RetrievalMode, RetrievalOptions, RetrieverComposer};
//! use std::sync::Arc;
//!
//! # async fn run() -> ragforge::error::Result<()> {
//! let embedder = Arc::new(HashEmbedder::new(384));
//! let vector_store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
//! vector_store.create_index("docs", 384, DistanceMetric::Cosine).await?;
//!
//! let composer = RetrieverComposer::new(embedder, vector_store);
//! let results = composer
//!     .retrieve(
//!         "what is retrieval-augmented generation?",
//!         &RetrievalMode::Dense { index: "docs".into(), metric: DistanceMetric::Cosine },
//!         &RetrievalOptions::default(),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ragforge-vector` | Pure-Rust HNSW vector store backend (default) |
//! | `local-embeddings` | `fastembed`-backed ONNX embedding models |
//!
//! ## Modules
//!
//! - [`adapters`] — Capability traits (embedder, LLM, vector store, graph
//!   store, reranker, chunker, document store) and their in-process
//!   implementations.
//! - [`cache`] — Embedding cache (LRU, SHA-256-keyed).
//! - [`cli`] — Maintenance CLI command definitions.
//! - [`config`] — `RagConfig` and its TOML/environment loading.
//! - [`context`] — The [`context::Context`] value threaded through pipeline
//!   stages.
//! - [`error`] — Crate-wide [`error::RagError`]/[`error::Result`].
//! - [`graphrag`] — Entity extraction, resolution, and community detection.
//! - [`ingestion`] — Producer → chunk → embed → batched-write pipeline.
//! - [`maintenance`] — Re-embedding, diagnostics, and index hygiene.
//! - [`query`] — Query rewrite/expand/decompose.
//! - [`rate_limit`] — Token-bucket rate limiting per `(provider, operation)`.
//! - [`retrieval`] — Dense/full-text/hybrid/graph retrieval composition.
//! - [`selfcorrect`] — Bounded self-correcting search/answer loops.
//! - [`telemetry`] — Span-based telemetry over a pluggable sink.
//! - [`types`] — Core data model (documents, chunks, entities, results).

#![warn(missing_docs)]

pub mod adapters;
pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod graphrag;
pub mod ingestion;
pub mod maintenance;
pub mod query;
pub mod rate_limit;
pub mod retrieval;
pub mod selfcorrect;
pub mod telemetry;
pub mod types;

pub use adapters::AdapterRegistry;
pub use context::Context;
pub use error::{RagError, Result};
