//! Durable SQLite [`KnowledgeStore`] backend.
//!
//! Documents, chunks, and embedding vectors live in one SQLite database
//! (WAL mode). Each document insert runs inside a transaction so a
//! concurrent query never sees a partially written document. Vector search
//! is brute-force cosine similarity over all stored vectors, computed in
//! process after decoding the little-endian f32 BLOBs.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Chunk, Document, RetrievedChunk};

use super::{sort_and_truncate, KnowledgeStore, StoreCounts};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
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

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, source_name, content_type, raw_text, upload_time, dedup_hash)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.source_name)
        .bind(&doc.content_type)
        .bind(&doc.raw_text)
        .bind(doc.upload_time)
        .bind(&doc.dedup_hash)
        .execute(&mut *tx)
        .await?;

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, chunk_index, text, hash) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO chunk_vectors (chunk_id, document_id, vector, dims) VALUES (?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(vec_to_blob(vector))
            .bind(vector.len() as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        // chunks and chunk_vectors cascade via foreign keys
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_by_dedup_hash(&self, dedup_hash: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT id FROM documents WHERE dedup_hash = ? LIMIT 1")
            .bind(dedup_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("id")))
    }

    async fn vector_search(
        &self,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT v.chunk_id, v.document_id, v.vector, c.text, d.source_name
            FROM chunk_vectors v
            JOIN chunks c ON c.id = v.chunk_id
            JOIN documents d ON d.id = v.document_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let candidates: Vec<RetrievedChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("vector");
                let vector = blob_to_vec(&blob);
                RetrievedChunk {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    source_name: row.get("source_name"),
                    text: row.get("text"),
                    score: cosine_similarity(query_vec, &vector),
                }
            })
            .collect();

        Ok(sort_and_truncate(candidates, limit))
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let vectors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(StoreCounts {
            documents,
            chunks,
            vectors,
        })
    }
}
