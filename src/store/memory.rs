//! In-memory [`KnowledgeStore`] for tests.
//!
//! `HashMap` and `Vec` behind `std::sync::RwLock`. Vector search is
//! brute-force cosine similarity over all stored vectors, the same as the
//! SQLite backend, so integration tests exercise identical semantics.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, Document, RetrievedChunk};

use super::{sort_and_truncate, KnowledgeStore, StoreCounts};

struct StoredChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// In-memory store used by unit and integration tests.
#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryStore {
    async fn insert_document(
        &self,
        doc: &Document,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        anyhow::ensure!(
            chunks.len() == vectors.len(),
            "chunks and vectors must be parallel"
        );
        // Both maps under write locks before any insert lands, so a reader
        // never observes a half-inserted document.
        let mut docs = self.docs.write().unwrap();
        let mut stored = self.chunks.write().unwrap();
        docs.insert(doc.id.clone(), doc.clone());
        for (c, v) in chunks.iter().zip(vectors.iter()) {
            stored.push(StoredChunk {
                chunk: c.clone(),
                vector: v.clone(),
            });
        }
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let mut docs = self.docs.write().unwrap();
        let mut stored = self.chunks.write().unwrap();
        docs.remove(document_id);
        stored.retain(|sc| sc.chunk.document_id != document_id);
        Ok(())
    }

    async fn find_by_dedup_hash(&self, dedup_hash: &str) -> Result<Option<String>> {
        let docs = self.docs.read().unwrap();
        Ok(docs
            .values()
            .find(|d| d.dedup_hash == dedup_hash)
            .map(|d| d.id.clone()))
    }

    async fn vector_search(
        &self,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let docs = self.docs.read().unwrap();
        let stored = self.chunks.read().unwrap();
        let candidates: Vec<RetrievedChunk> = stored
            .iter()
            .map(|sc| {
                let source_name = docs
                    .get(&sc.chunk.document_id)
                    .map(|d| d.source_name.clone())
                    .unwrap_or_default();
                RetrievedChunk {
                    chunk_id: sc.chunk.id.clone(),
                    document_id: sc.chunk.document_id.clone(),
                    source_name,
                    text: sc.chunk.text.clone(),
                    score: cosine_similarity(query_vec, &sc.vector),
                }
            })
            .collect();
        Ok(sort_and_truncate(candidates, limit))
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let docs = self.docs.read().unwrap();
        let chunks = self.chunks.read().unwrap();
        Ok(StoreCounts {
            documents: docs.len() as i64,
            chunks: chunks.len() as i64,
            vectors: chunks.len() as i64,
        })
    }
}
