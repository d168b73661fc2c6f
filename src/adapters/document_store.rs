//! The document-store capability: collection/document/chunk bookkeeping
//! backing ingestion and maintenance. The teacher keeps this in a SQL+vector
//! database (out of scope here per the external-interfaces contract); this
//! crate ships one in-memory adapter sufficient to drive ingestion and
//! maintenance end to end, matching the `InMemoryVectorStore`/
//! `InMemoryGraphStore` shape used for the other two stateful capabilities.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{RagError, Result};
use crate::types::{Chunk, Collection, Document, DocumentStatus};

/// A document-matching filter used by maintenance operations.
#[derive(Debug, Clone, Default)]
pub struct ChunkFilter {
    pub collection: Option<String>,
    pub without_embedding: bool,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_collection(&self, collection: Collection) -> Result<()>;
    async fn get_collection(&self, name: &str) -> Result<Option<Collection>>;
    async fn list_collections(&self) -> Result<Vec<Collection>>;

    async fn put_document(&self, document: Document) -> Result<()>;
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;
    async fn set_document_status(&self, id: &str, status: DocumentStatus, error_message: Option<String>) -> Result<()>;
    async fn documents_with_status(&self, status: DocumentStatus) -> Result<Vec<Document>>;

    async fn put_chunks(&self, chunks: Vec<Chunk>) -> Result<()>;
    async fn get_chunk(&self, id: &str) -> Result<Option<Chunk>>;
    async fn update_chunk_embedding(&self, id: &str, embedding: Vec<f32>) -> Result<()>;
    async fn chunks_matching(&self, filter: &ChunkFilter) -> Result<Vec<Chunk>>;
    /// Hard-deletes every chunk belonging to `document_id` (cascade).
    async fn delete_chunks_for_document(&self, document_id: &str) -> Result<usize>;

    async fn delete_document(&self, id: &str) -> Result<bool>;
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, Collection>,
    documents: HashMap<String, Document>,
    chunks: HashMap<String, Chunk>,
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    inner: RwLock<Inner>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create_collection(&self, collection: Collection) -> Result<()> {
        self.inner.write().collections.insert(collection.name.clone(), collection);
        Ok(())
    }

    async fn get_collection(&self, name: &str) -> Result<Option<Collection>> {
        Ok(self.inner.read().collections.get(name).cloned())
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        Ok(self.inner.read().collections.values().cloned().collect())
    }

    async fn put_document(&self, document: Document) -> Result<()> {
        self.inner.write().documents.insert(document.id.clone(), document);
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.inner.read().documents.get(id).cloned())
    }

    async fn set_document_status(&self, id: &str, status: DocumentStatus, error_message: Option<String>) -> Result<()> {
        let mut inner = self.inner.write();
        let document = inner.documents.get_mut(id).ok_or_else(|| RagError::NotFound(id.to_string()))?;
        document.status = status;
        document.error_message = error_message;
        Ok(())
    }

    async fn documents_with_status(&self, status: DocumentStatus) -> Result<Vec<Document>> {
        Ok(self
            .inner
            .read()
            .documents
            .values()
            .filter(|d| d.status == status)
            .cloned()
            .collect())
    }

    async fn put_chunks(&self, chunks: Vec<Chunk>) -> Result<()> {
        let mut inner = self.inner.write();
        for chunk in chunks {
            if let Some(document) = inner.documents.get_mut(&chunk.document_id) {
                document.chunk_count = document.chunk_count.max(chunk.chunk_index + 1);
            }
            inner.chunks.insert(chunk.id.clone(), chunk);
        }
        Ok(())
    }

    async fn get_chunk(&self, id: &str) -> Result<Option<Chunk>> {
        Ok(self.inner.read().chunks.get(id).cloned())
    }

    async fn update_chunk_embedding(&self, id: &str, embedding: Vec<f32>) -> Result<()> {
        let mut inner = self.inner.write();
        let chunk = inner.chunks.get_mut(id).ok_or_else(|| RagError::NotFound(id.to_string()))?;
        chunk.embedding = Some(embedding);
        Ok(())
    }

    async fn chunks_matching(&self, filter: &ChunkFilter) -> Result<Vec<Chunk>> {
        let inner = self.inner.read();
        Ok(inner
            .chunks
            .values()
            .filter(|c| {
                let collection_ok = match &filter.collection {
                    Some(collection) => inner
                        .documents
                        .get(&c.document_id)
                        .map(|d| &d.collection == collection)
                        .unwrap_or(false),
                    None => true,
                };
                let embedding_ok = !filter.without_embedding || c.embedding.is_none();
                collection_ok && embedding_ok
            })
            .cloned()
            .collect())
    }

    async fn delete_chunks_for_document(&self, document_id: &str) -> Result<usize> {
        let mut inner = self.inner.write();
        let before = inner.chunks.len();
        inner.chunks.retain(|_, c| c.document_id != document_id);
        Ok(before - inner.chunks.len())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner.write();
        let removed = inner.documents.remove(id).is_some();
        inner.chunks.retain(|_, c| c.document_id != id);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn document_lifecycle_round_trip() {
        let store = InMemoryDocumentStore::new();
        store.create_collection(Collection::new("docs")).await.unwrap();

        let mut document = Document::new("docs");
        document.title = Some("hello".into());
        let id = document.id.clone();
        store.put_document(document).await.unwrap();

        store
            .put_chunks(vec![Chunk::new(&id, "first chunk", 0), Chunk::new(&id, "second chunk", 1)])
            .await
            .unwrap();

        let fetched = store.get_document(&id).await.unwrap().unwrap();
        assert_eq!(fetched.chunk_count, 2);

        store.set_document_status(&id, DocumentStatus::Completed, None).await.unwrap();
        let fetched = store.get_document(&id).await.unwrap().unwrap();
        assert_eq!(fetched.status, DocumentStatus::Completed);

        let deleted = store.delete_chunks_for_document(&id).await.unwrap();
        assert_eq!(deleted, 2);
    }

    #[tokio::test]
    async fn chunks_matching_filters_by_collection_and_embedding() {
        let store = InMemoryDocumentStore::new();
        store.create_collection(Collection::new("a")).await.unwrap();
        store.create_collection(Collection::new("b")).await.unwrap();

        let doc_a = Document::new("a");
        let doc_b = Document::new("b");
        let (id_a, id_b) = (doc_a.id.clone(), doc_b.id.clone());
        store.put_document(doc_a).await.unwrap();
        store.put_document(doc_b).await.unwrap();

        let mut chunk_a = Chunk::new(&id_a, "in a", 0);
        chunk_a.embedding = Some(vec![1.0]);
        store.put_chunks(vec![chunk_a, Chunk::new(&id_b, "in b", 0)]).await.unwrap();

        let matches = store
            .chunks_matching(&ChunkFilter {
                collection: Some("a".into()),
                without_embedding: false,
            })
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].document_id, id_a);

        let without_embedding = store
            .chunks_matching(&ChunkFilter {
                collection: None,
                without_embedding: true,
            })
            .await
            .unwrap();
        assert_eq!(without_embedding.len(), 1);
        assert_eq!(without_embedding[0].document_id, id_b);
    }
}
