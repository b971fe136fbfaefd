//! Core data models used throughout Ragline.
//!
//! These types represent the documents, chunks, retrieval results, and
//! conversation turns that flow through the ingestion, retrieval, and
//! conversation pipelines.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A document ingested into the knowledge base.
///
/// Immutable once stored. Re-uploading the same source produces a new
/// document with a fresh id; identical text is detected via `dedup_hash`
/// and skipped.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    /// Human-readable origin: a filename, URL, or channel upload label.
    pub source_name: String,
    pub content_type: String,
    pub raw_text: String,
    pub upload_time: i64,
    /// SHA-256 of the trimmed text, for idempotent re-ingestion detection.
    pub dedup_hash: String,
}

/// A bounded slice of a document's text, the unit of retrieval.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of the chunk text.
    pub hash: String,
}

/// A chunk returned from vector search, with its similarity score and
/// enough document metadata to label sources in the prompt and the reply.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub source_name: String,
    pub text: String,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message within a conversation session.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}
