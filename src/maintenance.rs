//! Maintenance operations: re-embedding, diagnostics, embedding-consistency
//! verification, failed-document retry, and deleted-document cleanup, per
//! §4.10. Progress reporting follows the teacher's `rag/cache.rs`
//! `CacheStats`-style running counters, generalized into a pluggable
//! [`ProgressReporter`] so a CLI, a test, or a telemetry sink can each
//! observe the same event shape.

use std::sync::Arc;

use crate::adapters::document_store::{ChunkFilter, DocumentStore};
use crate::adapters::embedder::Embedder;
use crate::adapters::vector_store::VectorStore;
use crate::error::Result;
use crate::telemetry::TelemetrySink;
use crate::types::DocumentStatus;

/// One step of a running maintenance operation.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub operation: String,
    pub current: usize,
    pub total: usize,
    pub message: Option<String>,
}

impl ProgressEvent {
    pub fn percentage(&self) -> f32 {
        if self.total == 0 {
            100.0
        } else {
            (self.current as f32 / self.total as f32) * 100.0
        }
    }
}

/// Receives [`ProgressEvent`]s as a long-running operation advances.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Discards every event. The default for library callers that poll
/// [`ReembedReport`]/[`DiagnosticsReport`] instead.
#[derive(Default)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn report(&self, _event: ProgressEvent) {}
}

/// Prints `operation: current/total (percentage%) message` to stdout, the
/// shape the teacher's CLI output helpers (`cli/output.rs`) print progress
/// bars in.
#[derive(Default)]
pub struct TextReporter;

impl ProgressReporter for TextReporter {
    fn report(&self, event: ProgressEvent) {
        let percentage = event.percentage();
        match event.message {
            Some(message) => println!("{}: {}/{} ({percentage:.1}%) {message}", event.operation, event.current, event.total),
            None => println!("{}: {}/{} ({percentage:.1}%)", event.operation, event.current, event.total),
        }
    }
}

/// Emits each step as a telemetry counter, so maintenance progress shows up
/// alongside the rest of the crate's `tracing` output.
pub struct TelemetryReporter<'a> {
    sink: &'a dyn TelemetrySink,
}

impl<'a> TelemetryReporter<'a> {
    pub fn new(sink: &'a dyn TelemetrySink) -> Self {
        Self { sink }
    }
}

impl<'a> ProgressReporter for TelemetryReporter<'a> {
    fn report(&self, event: ProgressEvent) {
        let current = event.current.to_string();
        let total = event.total.to_string();
        self.sink.counter(&format!("maintenance.{}", event.operation), &[("current", &current), ("total", &total)]);
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReembedReport {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub errors: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct DiagnosticsReport {
    pub collections: usize,
    pub documents: usize,
    pub chunks: usize,
    pub chunks_without_embedding: usize,
    pub failed_documents: usize,
    pub storage_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub total_chunks: usize,
    pub consistent: bool,
    pub expected_dimensions: Option<usize>,
    pub offending_chunk_ids: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RetryReport {
    pub retried: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub documents_deleted: usize,
    pub chunks_deleted: usize,
}

/// Bundles the adapters maintenance operations need: a document store for
/// bookkeeping, a vector store for storage stats, and an embedder for
/// re-embedding.
pub struct MaintenanceOps {
    document_store: Arc<dyn DocumentStore>,
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    index: String,
}

impl MaintenanceOps {
    pub fn new(document_store: Arc<dyn DocumentStore>, vector_store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>, index: impl Into<String>) -> Self {
        Self {
            document_store,
            vector_store,
            embedder,
            index: index.into(),
        }
    }

    /// Re-embeds every chunk matching `filter`, updating the chunk's stored
    /// vector. Per-chunk failures are recorded but do not stop the run.
    pub async fn reembed(&self, filter: &ChunkFilter, reporter: &dyn ProgressReporter) -> Result<ReembedReport> {
        let chunks = self.document_store.chunks_matching(filter).await?;
        let total = chunks.len();
        let mut report = ReembedReport {
            total,
            ..Default::default()
        };

        for (i, chunk) in chunks.into_iter().enumerate() {
            match self.embedder.embed(&chunk.content).await {
                Ok(embedding) => match self.document_store.update_chunk_embedding(&chunk.id, embedding.vector).await {
                    Ok(()) => report.processed += 1,
                    Err(e) => {
                        report.failed += 1;
                        report.errors.push((chunk.id, e.to_string()));
                    }
                },
                Err(e) => {
                    report.failed += 1;
                    report.errors.push((chunk.id, e.to_string()));
                }
            }
            reporter.report(ProgressEvent {
                operation: "reembed".to_string(),
                current: i + 1,
                total,
                message: None,
            });
        }

        Ok(report)
    }

    /// Aggregate counts across collections, documents, and chunks, plus the
    /// vector store's reported storage footprint.
    pub async fn diagnostics(&self) -> Result<DiagnosticsReport> {
        let collections = self.document_store.list_collections().await?;
        let chunks = self.document_store.chunks_matching(&ChunkFilter::default()).await?;
        let failed_documents = self.document_store.documents_with_status(DocumentStatus::Failed).await?;

        let mut documents = 0usize;
        for status in [
            DocumentStatus::Pending,
            DocumentStatus::Processing,
            DocumentStatus::Completed,
            DocumentStatus::Failed,
            DocumentStatus::Deleted,
        ] {
            documents += self.document_store.documents_with_status(status).await?.len();
        }

        let storage_bytes = match self.vector_store.index_stats(&self.index).await {
            Ok(stats) => stats.memory_bytes,
            Err(_) => 0,
        };

        Ok(DiagnosticsReport {
            collections: collections.len(),
            documents,
            chunks: chunks.len(),
            chunks_without_embedding: chunks.iter().filter(|c| c.embedding.is_none()).count(),
            failed_documents: failed_documents.len(),
            storage_bytes,
        })
    }

    /// Confirms every chunk with an embedding shares the same vector width.
    pub async fn verify_embeddings(&self) -> Result<VerifyReport> {
        let chunks = self.document_store.chunks_matching(&ChunkFilter::default()).await?;
        let mut expected_dimensions: Option<usize> = None;
        let mut offending_chunk_ids = Vec::new();

        for chunk in &chunks {
            if let Some(embedding) = &chunk.embedding {
                match expected_dimensions {
                    None => expected_dimensions = Some(embedding.len()),
                    Some(dims) if dims != embedding.len() => offending_chunk_ids.push(chunk.id.clone()),
                    _ => {}
                }
            }
        }

        Ok(VerifyReport {
            total_chunks: chunks.len(),
            consistent: offending_chunk_ids.is_empty(),
            expected_dimensions,
            offending_chunk_ids,
        })
    }

    /// Flips every `Failed` document back to `Pending` and clears its error
    /// message, so the ingestion pipeline picks it up again.
    pub async fn retry_failed(&self) -> Result<RetryReport> {
        let failed = self.document_store.documents_with_status(DocumentStatus::Failed).await?;
        let mut retried = 0;
        for document in failed {
            self.document_store.set_document_status(&document.id, DocumentStatus::Pending, None).await?;
            retried += 1;
        }
        Ok(RetryReport { retried })
    }

    /// Hard-deletes every document marked `Deleted`, cascading to its
    /// chunks.
    pub async fn cleanup_deleted(&self) -> Result<CleanupReport> {
        let deleted = self.document_store.documents_with_status(DocumentStatus::Deleted).await?;
        let mut report = CleanupReport::default();
        for document in deleted {
            let chunks_deleted = self.document_store.delete_chunks_for_document(&document.id).await?;
            self.document_store.delete_document(&document.id).await?;
            report.documents_deleted += 1;
            report.chunks_deleted += chunks_deleted;
        }
        Ok(report)
    }
}
