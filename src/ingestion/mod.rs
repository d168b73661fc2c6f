//! Ingestion pipeline: producer -> chunking -> rate-limited embedding ->
//! batched vector-store write, per §4.9. Grounded in the teacher's
//! `llm/coordinator.rs` bounded worker-pool idiom (`buffer_unordered` over a
//! stream of futures, already reused by [`crate::graphrag::extract_batch`])
//! for the CPU-bound chunking and embedding stages, and in the teacher's
//! `rag/cache.rs` progress-counter pattern for the batched writer.
//!
//! Intra-file chunk order is preserved (`chunk_index` is assigned
//! sequentially per document before any concurrency is introduced);
//! inter-file order is not — documents are chunked and embedded concurrently
//! and may complete in any order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use md5::{Digest, Md5};
use tokio::sync::mpsc;

use crate::adapters::chunker::{Chunker, ChunkerConfig};
use crate::adapters::document_store::DocumentStore;
use crate::adapters::embedder::{instrumented_embed, Embedder};
use crate::adapters::vector_store::{instrumented_store_batch, DistanceMetric, VectorItem, VectorStore};
use crate::error::Result;
use crate::rate_limit::{Admission, RateLimiter};
use crate::telemetry::{NullTelemetrySink, Telemetry, TelemetrySink};
use crate::types::{Chunk, Document, DocumentStatus};

/// One document handed to the producer stage: content already read into
/// memory (file discovery and remote fetch are the caller's concern, kept
/// out of scope per the external-interfaces note).
#[derive(Debug, Clone)]
pub struct IngestItem {
    pub source_path: String,
    pub collection: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunker: ChunkerConfig,
    pub chunk_workers: usize,
    pub embed_workers: usize,
    pub batch_size: usize,
    pub batch_timeout: Duration,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            chunk_workers: 10,
            embed_workers: 10,
            batch_size: 100,
            batch_timeout: Duration::from_secs(2),
        }
    }
}

/// Outcome of one [`IngestionPipeline::ingest`] run.
#[derive(Debug, Clone, Default)]
pub struct IngestionReport {
    pub documents_completed: usize,
    pub documents_failed: usize,
    pub chunks_written: usize,
    /// Chunks that hit the rate limiter at least once before embedding
    /// succeeded. Not a failure count — see [`EmbedOutcome::RateLimited`].
    pub chunks_rate_limited: usize,
    pub errors: Vec<(String, String)>,
}

struct ChunkedDocument {
    document_id: String,
    source_path: String,
    chunks: Vec<Chunk>,
}

struct EmbeddedChunk {
    document_id: String,
    source_path: String,
    chunk_id: String,
    vector: Vec<f32>,
    content: String,
}

/// One pending chunk waiting for its embedding call.
struct PendingChunk {
    document_id: String,
    source_path: String,
    chunk: Chunk,
}

/// Result of one [`IngestionPipeline::embed_chunk`] attempt.
enum EmbedOutcome {
    Embedded(EmbeddedChunk),
    Failed(String, String, String),
    /// The rate limiter is backing off; the chunk was not submitted and
    /// should be re-enqueued for a later round.
    RateLimited(PendingChunk, Duration),
}

/// `"<source8>:<chunk_index>:<content8>"`, the first 8 hex characters of the
/// MD5 digest of the source identifier and of the chunk content, giving a
/// stable, idempotent id so re-ingesting the same document overwrites
/// existing vectors rather than duplicating them.
fn item_id(source: &str, chunk_index: usize, content: &str) -> String {
    let source_hash = hex8(source.as_bytes());
    let content_hash = hex8(content.as_bytes());
    format!("{source_hash}:{chunk_index}:{content_hash}")
}

fn hex8(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    format!("{:02x}{:02x}{:02x}{:02x}", digest[0], digest[1], digest[2], digest[3])
}

/// Drives a document's content from raw text through to embedded,
/// vector-store-persisted chunks.
pub struct IngestionPipeline {
    document_store: Arc<dyn DocumentStore>,
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    chunker: Arc<dyn Chunker>,
    rate_limiter: Arc<RateLimiter>,
    index: String,
    telemetry: Arc<dyn TelemetrySink>,
}

impl IngestionPipeline {
    pub fn new(
        document_store: Arc<dyn DocumentStore>,
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        chunker: Arc<dyn Chunker>,
        rate_limiter: Arc<RateLimiter>,
        index: impl Into<String>,
    ) -> Self {
        Self {
            document_store,
            vector_store,
            embedder,
            chunker,
            rate_limiter,
            index: index.into(),
            telemetry: Arc::new(NullTelemetrySink),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub async fn ingest(&self, items: Vec<IngestItem>, opts: &IngestionOptions) -> Result<IngestionReport> {
        self.vector_store
            .create_index(&self.index, self.embedder.dimensions(), DistanceMetric::Cosine)
            .await?;

        let mut report = IngestionReport::default();

        // Stage 1: parse + chunk, bounded concurrency, one failure isolated
        // per file.
        let chunked: Vec<std::result::Result<ChunkedDocument, (String, String)>> =
            stream::iter(items.into_iter().map(|item| self.chunk_document(item, opts)))
                .buffer_unordered(opts.chunk_workers.max(1))
                .collect()
                .await;

        let mut documents: Vec<ChunkedDocument> = Vec::new();
        for outcome in chunked {
            match outcome {
                Ok(doc) => documents.push(doc),
                Err((source_path, reason)) => {
                    report.documents_failed += 1;
                    report.errors.push((source_path, reason));
                }
            }
        }

        // Stage 2: rate-limited embedding, bounded concurrency. Flattened
        // across documents so a slow document doesn't stall embedding of
        // chunks from others already chunked. Chunks that hit the rate
        // limiter are re-enqueued for the next round rather than holding
        // their worker slot asleep.
        let mut pending: Vec<PendingChunk> = Vec::new();
        for doc in &documents {
            for chunk in &doc.chunks {
                pending.push(PendingChunk {
                    document_id: doc.document_id.clone(),
                    source_path: doc.source_path.clone(),
                    chunk: chunk.clone(),
                });
            }
        }

        let (tx, rx) = mpsc::channel::<EmbeddedChunk>(opts.batch_size.max(1) * 2);
        let writer = {
            let vector_store = self.vector_store.clone();
            let document_store = self.document_store.clone();
            let index = self.index.clone();
            let batch_size = opts.batch_size.max(1);
            let batch_timeout = opts.batch_timeout;
            let telemetry = self.telemetry.clone();
            tokio::spawn(async move { run_batched_writer(vector_store, document_store, index, rx, batch_size, batch_timeout, telemetry).await })
        };

        let mut failed_documents: HashMap<String, String> = HashMap::new();
        let mut tx = Some(tx);

        while !pending.is_empty() {
            let embed_outcomes: Vec<EmbedOutcome> = stream::iter(pending.drain(..).map(|p| self.embed_chunk(p, opts)))
                .buffer_unordered(opts.embed_workers.max(1))
                .collect()
                .await;

            let mut next_round: Vec<PendingChunk> = Vec::new();
            let mut retry_after = Duration::ZERO;

            for outcome in embed_outcomes {
                match outcome {
                    EmbedOutcome::Embedded(embedded) => {
                        if let Some(sender) = &tx {
                            // A channel send error means the writer task has
                            // already exited (e.g. on a store error); drop
                            // the sender so later rounds stop trying.
                            if sender.send(embedded).await.is_err() {
                                tx = None;
                            }
                        }
                    }
                    EmbedOutcome::Failed(document_id, source_path, reason) => {
                        failed_documents.entry(document_id).or_insert_with(|| reason.clone());
                        report.errors.push((source_path, reason));
                    }
                    EmbedOutcome::RateLimited(pending_chunk, wait) => {
                        report.chunks_rate_limited += 1;
                        retry_after = retry_after.max(wait);
                        next_round.push(pending_chunk);
                    }
                }
            }

            pending = next_round;
            if !pending.is_empty() {
                tokio::time::sleep(retry_after).await;
            }
        }
        drop(tx);

        report.chunks_written = writer.await.map_err(|e| crate::error::RagError::Internal(e.to_string()))??;

        for doc in documents {
            if let Some(reason) = failed_documents.get(&doc.document_id) {
                self.document_store
                    .set_document_status(&doc.document_id, DocumentStatus::Failed, Some(reason.clone()))
                    .await?;
                report.documents_failed += 1;
            } else {
                self.document_store
                    .set_document_status(&doc.document_id, DocumentStatus::Completed, None)
                    .await?;
                report.documents_completed += 1;
            }
        }

        Ok(report)
    }

    async fn chunk_document(&self, item: IngestItem, opts: &IngestionOptions) -> std::result::Result<ChunkedDocument, (String, String)> {
        let mut document = Document::new(&item.collection);
        document.source_path = Some(item.source_path.clone());
        let document_id = document.id.clone();

        let spans = self
            .chunker
            .chunk(&item.content, &opts.chunker)
            .map_err(|e| (item.source_path.clone(), e.to_string()))?;

        let chunks: Vec<Chunk> = spans
            .into_iter()
            .map(|span| {
                let mut chunk = Chunk::new(&document_id, span.content, span.index);
                chunk.start_char = Some(span.start_char);
                chunk.end_char = Some(span.end_char);
                chunk.token_count = span.token_count;
                chunk
            })
            .collect();

        document.chunk_count = chunks.len();
        self.document_store
            .put_document(document)
            .await
            .map_err(|e| (item.source_path.clone(), e.to_string()))?;
        self.document_store
            .set_document_status(&document_id, DocumentStatus::Processing, None)
            .await
            .map_err(|e| (item.source_path.clone(), e.to_string()))?;
        self.document_store
            .put_chunks(chunks.clone())
            .await
            .map_err(|e| (item.source_path.clone(), e.to_string()))?;

        Ok(ChunkedDocument {
            document_id,
            source_path: item.source_path,
            chunks,
        })
    }

    /// Tries to embed one chunk. A rate-limiter backoff re-enqueues the
    /// chunk rather than sleeping in place, so the caller's worker slot is
    /// released immediately for the next pending chunk.
    async fn embed_chunk(&self, pending: PendingChunk, opts: &IngestionOptions) -> EmbedOutcome {
        let provider = self.embedder.model_name().to_string();
        if let Admission::Backoff(wait) = self.rate_limiter.check(&provider, "embedding") {
            let telemetry = Telemetry::new(self.telemetry.as_ref());
            telemetry.counter("rag.embed", &[("reason", "rate_limited"), ("provider", &provider)]);
            return EmbedOutcome::RateLimited(pending, wait);
        }

        let PendingChunk {
            document_id,
            source_path,
            chunk,
        } = pending;

        let embedding = match instrumented_embed(self.telemetry.as_ref(), self.embedder.as_ref(), &chunk.content).await {
            Ok(embedding) => embedding,
            Err(e) => return EmbedOutcome::Failed(document_id, source_path, e.to_string()),
        };

        if let Err(e) = self.document_store.update_chunk_embedding(&chunk.id, embedding.vector.clone()).await {
            return EmbedOutcome::Failed(document_id, source_path, e.to_string());
        }

        let _ = opts;
        EmbedOutcome::Embedded(EmbeddedChunk {
            chunk_id: item_id(&source_path, chunk.chunk_index, &chunk.content),
            document_id,
            source_path,
            vector: embedding.vector,
            content: chunk.content,
        })
    }
}

async fn run_batched_writer(
    vector_store: Arc<dyn VectorStore>,
    document_store: Arc<dyn DocumentStore>,
    index: String,
    mut rx: mpsc::Receiver<EmbeddedChunk>,
    batch_size: usize,
    batch_timeout: Duration,
    telemetry: Arc<dyn TelemetrySink>,
) -> Result<usize> {
    let _ = document_store;
    let mut batch: Vec<EmbeddedChunk> = Vec::with_capacity(batch_size);
    let mut written = 0usize;

    loop {
        match tokio::time::timeout(batch_timeout, rx.recv()).await {
            Ok(Some(item)) => {
                batch.push(item);
                if batch.len() >= batch_size {
                    written += flush_batch(&vector_store, &index, &mut batch, telemetry.as_ref()).await?;
                }
            }
            Ok(None) => {
                if !batch.is_empty() {
                    written += flush_batch(&vector_store, &index, &mut batch, telemetry.as_ref()).await?;
                }
                break;
            }
            Err(_elapsed) => {
                if !batch.is_empty() {
                    written += flush_batch(&vector_store, &index, &mut batch, telemetry.as_ref()).await?;
                }
            }
        }
    }

    Ok(written)
}

async fn flush_batch(
    vector_store: &Arc<dyn VectorStore>,
    index: &str,
    batch: &mut Vec<EmbeddedChunk>,
    telemetry: &dyn TelemetrySink,
) -> Result<usize> {
    let items: Vec<VectorItem> = batch
        .drain(..)
        .map(|embedded| VectorItem {
            id: embedded.chunk_id,
            vector: embedded.vector,
            metadata: HashMap::from([
                ("document_id".to_string(), serde_json::Value::String(embedded.document_id)),
                ("source_path".to_string(), serde_json::Value::String(embedded.source_path)),
                ("content".to_string(), serde_json::Value::String(embedded.content)),
            ]),
        })
        .collect();
    instrumented_store_batch(telemetry, vector_store.as_ref(), index, items).await
}
