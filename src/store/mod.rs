//! Storage abstraction for the knowledge base.
//!
//! The [`KnowledgeStore`] trait defines everything the ingestion and
//! retrieval pipelines need from persistence, enabling pluggable backends:
//! SQLite for the durable knowledge base and an in-memory store for tests.
//!
//! Implementations must be `Send + Sync`. A document and all of its chunks
//! and vectors are written atomically: a concurrent query sees either none
//! of a document's chunks or all of them.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{Chunk, Document, RetrievedChunk};

/// Document/chunk/vector totals, served by the `stats` command and endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StoreCounts {
    pub documents: i64,
    pub chunks: i64,
    pub vectors: i64,
}

/// Abstract storage backend for documents, chunks, and embeddings.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Insert a document with its chunks and their embedding vectors, as a
    /// single atomic unit. `vectors` must be parallel to `chunks`.
    async fn insert_document(
        &self,
        doc: &Document,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()>;

    /// Delete a document and, by cascade, all of its chunks and vectors.
    async fn delete_document(&self, document_id: &str) -> Result<()>;

    /// Look up a document id by dedup hash (idempotent re-ingestion check).
    async fn find_by_dedup_hash(&self, dedup_hash: &str) -> Result<Option<String>>;

    /// Brute-force cosine-similarity search over all stored vectors.
    ///
    /// Returns up to `limit` candidates ordered by descending score; ties
    /// broken by ascending chunk id so results are deterministic.
    async fn vector_search(&self, query_vec: &[f32], limit: usize)
        -> Result<Vec<RetrievedChunk>>;

    /// Totals for the stats surface.
    async fn counts(&self) -> Result<StoreCounts>;
}

/// Shared ordering for search candidates: descending score, then ascending
/// chunk id. Both backends funnel through this so ordering stays identical.
pub fn sort_and_truncate(mut candidates: Vec<RetrievedChunk>, limit: usize) -> Vec<RetrievedChunk> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    candidates.truncate(limit);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(chunk_id: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: chunk_id.to_string(),
            document_id: "d1".to_string(),
            source_name: "test".to_string(),
            text: String::new(),
            score,
        }
    }

    #[test]
    fn orders_by_score_then_id() {
        let out = sort_and_truncate(
            vec![
                candidate("c", 0.5),
                candidate("a", 0.9),
                candidate("b", 0.9),
            ],
            10,
        );
        let ids: Vec<&str> = out.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn truncates_to_limit() {
        let out = sort_and_truncate(
            vec![candidate("a", 0.1), candidate("b", 0.2), candidate("c", 0.3)],
            2,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].chunk_id, "c");
    }
}
