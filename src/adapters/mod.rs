//! Capability contracts and the registry that resolves them.
//!
//! Modeled on the teacher's `ProviderRegistry`/`AgentRegistry`
//! (`llm/provider_registry.rs`, `agents/registry.rs`): a struct holding one
//! map per capability, `Capability -> Arc<dyn Trait>`, with per-call
//! override resolved by an optional context argument before falling back to
//! the registry's process-wide default. Resolution never inspects anything
//! other than the already-resolved reference held on the `Context` once a
//! pipeline is running — no lookups happen in hot loops.

pub mod chunker;
pub mod document_store;
pub mod embedder;
pub mod graph_store;
pub mod llm;
pub mod reranker;
pub mod vector_store;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{RagError, Result};

pub use chunker::Chunker;
pub use document_store::DocumentStore;
pub use embedder::Embedder;
pub use graph_store::GraphStore;
pub use llm::LlmClient;
pub use reranker::Reranker;
pub use vector_store::VectorStore;

/// A capability name, used as the registry's lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Embedder,
    Llm,
    VectorStore,
    GraphStore,
    Reranker,
    Chunker,
    DocumentStore,
}

impl Capability {
    fn as_str(self) -> &'static str {
        match self {
            Capability::Embedder => "embedder",
            Capability::Llm => "llm",
            Capability::VectorStore => "vector_store",
            Capability::GraphStore => "graph_store",
            Capability::Reranker => "reranker",
            Capability::Chunker => "chunker",
            Capability::DocumentStore => "document_store",
        }
    }
}

/// Resolves a capability name to a concrete implementation.
///
/// Registration is process-wide; callers needing a different adapter for a
/// single call construct their own registry (or clone this one and swap one
/// entry) rather than mutating global state mid-pipeline.
#[derive(Default)]
pub struct AdapterRegistry {
    embedders: HashMap<String, Arc<dyn Embedder>>,
    llms: HashMap<String, Arc<dyn LlmClient>>,
    vector_stores: HashMap<String, Arc<dyn VectorStore>>,
    graph_stores: HashMap<String, Arc<dyn GraphStore>>,
    rerankers: HashMap<String, Arc<dyn Reranker>>,
    chunkers: HashMap<String, Arc<dyn Chunker>>,
    document_stores: HashMap<String, Arc<dyn DocumentStore>>,
    defaults: HashMap<Capability, String>,
}

/// Default name used when a caller registers exactly one adapter for a
/// capability and never names it.
pub const DEFAULT_NAME: &str = "default";

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_embedder(&mut self, name: impl Into<String>, adapter: Arc<dyn Embedder>) {
        let name = name.into();
        self.defaults.entry(Capability::Embedder).or_insert_with(|| name.clone());
        self.embedders.insert(name, adapter);
    }

    pub fn register_llm(&mut self, name: impl Into<String>, adapter: Arc<dyn LlmClient>) {
        let name = name.into();
        self.defaults.entry(Capability::Llm).or_insert_with(|| name.clone());
        self.llms.insert(name, adapter);
    }

    pub fn register_vector_store(&mut self, name: impl Into<String>, adapter: Arc<dyn VectorStore>) {
        let name = name.into();
        self.defaults.entry(Capability::VectorStore).or_insert_with(|| name.clone());
        self.vector_stores.insert(name, adapter);
    }

    pub fn register_graph_store(&mut self, name: impl Into<String>, adapter: Arc<dyn GraphStore>) {
        let name = name.into();
        self.defaults.entry(Capability::GraphStore).or_insert_with(|| name.clone());
        self.graph_stores.insert(name, adapter);
    }

    pub fn register_reranker(&mut self, name: impl Into<String>, adapter: Arc<dyn Reranker>) {
        let name = name.into();
        self.defaults.entry(Capability::Reranker).or_insert_with(|| name.clone());
        self.rerankers.insert(name, adapter);
    }

    pub fn register_chunker(&mut self, name: impl Into<String>, adapter: Arc<dyn Chunker>) {
        let name = name.into();
        self.defaults.entry(Capability::Chunker).or_insert_with(|| name.clone());
        self.chunkers.insert(name, adapter);
    }

    pub fn register_document_store(&mut self, name: impl Into<String>, adapter: Arc<dyn DocumentStore>) {
        let name = name.into();
        self.defaults.entry(Capability::DocumentStore).or_insert_with(|| name.clone());
        self.document_stores.insert(name, adapter);
    }

    /// Explicit override takes `Some(name)`; `None` falls back to the
    /// registry's process-wide default for the capability.
    pub fn embedder(&self, name: Option<&str>) -> Result<Arc<dyn Embedder>> {
        self.resolve(&self.embedders, Capability::Embedder, name)
    }

    pub fn llm(&self, name: Option<&str>) -> Result<Arc<dyn LlmClient>> {
        self.resolve(&self.llms, Capability::Llm, name)
    }

    pub fn vector_store(&self, name: Option<&str>) -> Result<Arc<dyn VectorStore>> {
        self.resolve(&self.vector_stores, Capability::VectorStore, name)
    }

    pub fn graph_store(&self, name: Option<&str>) -> Result<Arc<dyn GraphStore>> {
        self.resolve(&self.graph_stores, Capability::GraphStore, name)
    }

    pub fn reranker(&self, name: Option<&str>) -> Result<Arc<dyn Reranker>> {
        self.resolve(&self.rerankers, Capability::Reranker, name)
    }

    pub fn chunker(&self, name: Option<&str>) -> Result<Arc<dyn Chunker>> {
        self.resolve(&self.chunkers, Capability::Chunker, name)
    }

    pub fn document_store(&self, name: Option<&str>) -> Result<Arc<dyn DocumentStore>> {
        self.resolve(&self.document_stores, Capability::DocumentStore, name)
    }

    fn resolve<T: ?Sized>(
        &self,
        map: &HashMap<String, Arc<T>>,
        capability: Capability,
        name: Option<&str>,
    ) -> Result<Arc<T>> {
        let key = name
            .or_else(|| self.defaults.get(&capability).map(String::as_str))
            .ok_or_else(|| RagError::NoAdapter(capability.as_str().to_string()))?;
        map.get(key)
            .cloned()
            .ok_or_else(|| RagError::NoAdapter(capability.as_str().to_string()))
    }
}
