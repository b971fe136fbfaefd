//! Typed error taxonomy for the query and ingestion pipelines.
//!
//! Component failures propagate as typed errors so each channel adapter can
//! choose its own user-facing wording; nothing is swallowed inside the
//! engine. `anyhow` carries the underlying cause.

use thiserror::Error;

/// Failure modes of a single query turn.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The embedding client or the vector index failed. The caller must
    /// surface this as "knowledge base temporarily unavailable" — never
    /// silently answer ungrounded.
    #[error("knowledge base unavailable: {0}")]
    RetrievalUnavailable(#[source] anyhow::Error),

    /// The generation client failed or timed out. The caller replies with
    /// an apologetic fallback; the conversation turn is still recorded.
    #[error("generation unavailable: {0}")]
    GenerationUnavailable(#[source] anyhow::Error),
}

/// Failure modes of document ingestion. On any of these the document is
/// not created.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("document is empty")]
    EmptyDocument,

    #[error("could not read document: {0}")]
    Unreadable(String),

    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(#[source] anyhow::Error),

    #[error("knowledge store failure: {0}")]
    Store(#[source] anyhow::Error),
}
