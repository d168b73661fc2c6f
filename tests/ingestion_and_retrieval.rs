//! End-to-end ingestion-then-retrieval: the ingestion pipeline writes
//! embedded chunks into a vector store, and the retriever composer reads
//! them back out again, exercising both through their public adapter
//! traits rather than mocking either side.

use std::sync::Arc;

use ragforge::adapters::chunker::TextChunker;
use ragforge::adapters::document_store::{DocumentStore, InMemoryDocumentStore};
use ragforge::adapters::embedder::{Embedder, HashEmbedder};
use ragforge::adapters::vector_store::{DistanceMetric, InMemoryVectorStore, VectorStore};
use ragforge::ingestion::{IngestItem, IngestionOptions, IngestionPipeline};
use ragforge::rate_limit::RateLimiter;
use ragforge::retrieval::{RetrievalMode, RetrievalOptions, RetrieverComposer};
use ragforge::types::DocumentStatus;

const INDEX: &str = "docs";

#[tokio::test]
async fn ingested_documents_are_retrievable_by_dense_search() {
    let document_store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let vector_store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(32));

    let pipeline = IngestionPipeline::new(
        document_store.clone(),
        vector_store.clone(),
        embedder.clone(),
        Arc::new(TextChunker::new()),
        Arc::new(RateLimiter::default()),
        INDEX,
    );

    let items = vec![
        IngestItem {
            source_path: "rust-overview.md".into(),
            collection: "docs".into(),
            content: "Rust is a systems programming language focused on safety and concurrency.".into(),
        },
        IngestItem {
            source_path: "python-overview.md".into(),
            collection: "docs".into(),
            content: "Python is a dynamically typed scripting language popular for data science.".into(),
        },
    ];

    let report = pipeline.ingest(items, &IngestionOptions::default()).await.unwrap();
    assert_eq!(report.documents_completed, 2);
    assert_eq!(report.documents_failed, 0);
    assert!(report.chunks_written >= 2);

    let completed = document_store
        .documents_with_status(DocumentStatus::Completed)
        .await
        .unwrap();
    assert_eq!(completed.len(), 2);

    let composer = RetrieverComposer::new(embedder, vector_store);
    let results = composer
        .retrieve(
            "Rust is a systems programming language focused on safety and concurrency.",
            &RetrievalMode::Dense {
                index: INDEX.into(),
                metric: DistanceMetric::Cosine,
            },
            &RetrievalOptions::default(),
        )
        .await
        .unwrap();

    assert!(!results.is_empty());
    let top = &results[0];
    assert_eq!(top.metadata.get("document_id").and_then(|v| v.as_str()), completed.iter().find(|d| d.source_path.as_deref() == Some("rust-overview.md")).map(|d| d.id.as_str()));
}

#[tokio::test]
async fn reingesting_the_same_content_does_not_duplicate_vectors() {
    let document_store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let vector_store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));

    let pipeline = IngestionPipeline::new(
        document_store,
        vector_store.clone(),
        embedder,
        Arc::new(TextChunker::new()),
        Arc::new(RateLimiter::default()),
        INDEX,
    );

    let item = IngestItem {
        source_path: "notes.txt".into(),
        collection: "docs".into(),
        content: "idempotent ingestion keeps the index stable across reruns".into(),
    };

    pipeline.ingest(vec![item.clone()], &IngestionOptions::default()).await.unwrap();
    let stats_first = vector_store.index_stats(INDEX).await.unwrap();

    pipeline.ingest(vec![item], &IngestionOptions::default()).await.unwrap();
    let stats_second = vector_store.index_stats(INDEX).await.unwrap();

    assert_eq!(stats_first.vector_count, stats_second.vector_count);
}

#[tokio::test]
async fn failed_chunk_documents_are_marked_failed_and_others_still_complete() {
    // A chunker that rejects anything mentioning "poison" lets us exercise
    // per-document failure isolation without a special ingestion knob.
    struct PoisonAwareChunker(TextChunker);

    impl ragforge::adapters::chunker::Chunker for PoisonAwareChunker {
        fn chunk(
            &self,
            text: &str,
            config: &ragforge::adapters::chunker::ChunkerConfig,
        ) -> ragforge::error::Result<Vec<ragforge::adapters::chunker::ChunkSpan>> {
            if text.contains("poison") {
                return Err(ragforge::error::RagError::Internal("poisoned input".into()));
            }
            self.0.chunk(text, config)
        }
    }

    let document_store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let vector_store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));

    let pipeline = IngestionPipeline::new(
        document_store,
        vector_store,
        embedder,
        Arc::new(PoisonAwareChunker(TextChunker::new())),
        Arc::new(RateLimiter::default()),
        INDEX,
    );

    let items = vec![
        IngestItem {
            source_path: "good.txt".into(),
            collection: "docs".into(),
            content: "a perfectly ordinary document".into(),
        },
        IngestItem {
            source_path: "bad.txt".into(),
            collection: "docs".into(),
            content: "this document contains poison".into(),
        },
    ];

    let report = pipeline.ingest(items, &IngestionOptions::default()).await.unwrap();
    assert_eq!(report.documents_completed, 1);
    assert_eq!(report.documents_failed, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].0, "bad.txt");
}
