//! Maintenance CLI: `reembed`, `diagnostics`, `verify`, `retry-failed`, and
//! `cleanup-deleted` as subcommands over [`crate::maintenance::MaintenanceOps`].
//! Adapted from the teacher's `cli/mod.rs`/`cli/output.rs` command-dispatch
//! and colored-output conventions (`clap` derive + `owo-colors`), trimmed
//! from a chat REPL down to a one-shot operations CLI.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;

use crate::adapters::document_store::{ChunkFilter, DocumentStore, InMemoryDocumentStore};
use crate::adapters::embedder::{Embedder, HashEmbedder};
use crate::adapters::vector_store::{InMemoryVectorStore, VectorStore};
use crate::config::RagConfig;
use crate::error::Result;
use crate::maintenance::{MaintenanceOps, ProgressReporter, TextReporter};

const DEFAULT_INDEX: &str = "default";

#[derive(Debug, Parser)]
#[command(name = "ragforge", version, about = "Maintenance operations for a ragforge index")]
pub struct Cli {
    /// Path to a RagConfig TOML file. Falls back to compiled-in defaults
    /// plus `RAG_`-prefixed environment variables when absent.
    #[arg(long, env = "RAGFORGE_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Re-embed chunks, optionally restricted to one collection or to
    /// chunks missing an embedding.
    Reembed {
        #[arg(long)]
        collection: Option<String>,
        #[arg(long)]
        without_embedding_only: bool,
    },
    /// Print aggregate counts across collections, documents, and chunks.
    Diagnostics,
    /// Check that every embedded chunk shares the same vector width.
    Verify,
    /// Reset every `failed` document back to `pending`.
    RetryFailed,
    /// Hard-delete every document marked `deleted`, cascading to its chunks.
    CleanupDeleted,
}

/// Runs one CLI invocation against an in-memory document store and the
/// default vector store backend. A real deployment would wire persistent
/// adapters (a database-backed `DocumentStore`, the `ragforge-vector`
/// backend opened against a data directory) in place of these; persistent
/// document-store adapters are out of scope for this crate (see
/// `adapters/document_store.rs`).
pub async fn run(cli: Cli) -> Result<()> {
    let _config = RagConfig::load(cli.config.as_deref())?;

    let document_store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let vector_store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(384));
    let ops = MaintenanceOps::new(document_store, vector_store, embedder, DEFAULT_INDEX);
    let reporter = TextReporter;

    match cli.command {
        Command::Reembed {
            collection,
            without_embedding_only,
        } => run_reembed(&ops, collection, without_embedding_only, &reporter).await?,
        Command::Diagnostics => run_diagnostics(&ops).await?,
        Command::Verify => run_verify(&ops).await?,
        Command::RetryFailed => run_retry_failed(&ops).await?,
        Command::CleanupDeleted => run_cleanup_deleted(&ops).await?,
    }

    Ok(())
}

async fn run_reembed(ops: &MaintenanceOps, collection: Option<String>, without_embedding_only: bool, reporter: &dyn ProgressReporter) -> Result<()> {
    let filter = ChunkFilter {
        collection,
        without_embedding: without_embedding_only,
    };
    let report = ops.reembed(&filter, reporter).await?;
    println!(
        "{} {} processed, {} failed (of {})",
        "reembed:".bold(),
        report.processed.to_string().green(),
        report.failed.to_string().red(),
        report.total
    );
    for (chunk_id, error) in &report.errors {
        println!("  {} {chunk_id}: {error}", "error:".red());
    }
    Ok(())
}

async fn run_diagnostics(ops: &MaintenanceOps) -> Result<()> {
    let report = ops.diagnostics().await?;
    println!("{}", "diagnostics:".bold());
    println!("  collections:              {}", report.collections);
    println!("  documents:                {}", report.documents);
    println!("  chunks:                   {}", report.chunks);
    println!("  chunks without embedding: {}", report.chunks_without_embedding);
    println!("  failed documents:         {}", report.failed_documents);
    println!("  storage bytes:            {}", report.storage_bytes);
    Ok(())
}

async fn run_verify(ops: &MaintenanceOps) -> Result<()> {
    let report = ops.verify_embeddings().await?;
    if report.consistent {
        println!(
            "{} {} chunks, dimensions {:?}",
            "consistent:".green().bold(),
            report.total_chunks,
            report.expected_dimensions
        );
    } else {
        println!(
            "{} {} of {} chunks have mismatched dimensions",
            "inconsistent:".red().bold(),
            report.offending_chunk_ids.len(),
            report.total_chunks
        );
    }
    Ok(())
}

async fn run_retry_failed(ops: &MaintenanceOps) -> Result<()> {
    let report = ops.retry_failed().await?;
    println!("{} {} documents reset to pending", "retry-failed:".bold(), report.retried);
    Ok(())
}

async fn run_cleanup_deleted(ops: &MaintenanceOps) -> Result<()> {
    let report = ops.cleanup_deleted().await?;
    println!(
        "{} {} documents, {} chunks removed",
        "cleanup-deleted:".bold(),
        report.documents_deleted,
        report.chunks_deleted
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_well_formed() {
        Cli::command().debug_assert();
    }
}
