//! Knowledge-base statistics, shared by the CLI `stats` command, the
//! `/stats` endpoint, and the messaging `stats` keyword reply.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

use crate::session::SessionManager;
use crate::store::KnowledgeStore;

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub documents: i64,
    pub chunks: i64,
    pub vectors: i64,
    pub live_sessions: usize,
    pub embedding_model: String,
    pub generation_model: String,
}

pub async fn gather(
    store: &Arc<dyn KnowledgeStore>,
    sessions: Option<&SessionManager>,
    embedding_model: &str,
    generation_model: &str,
) -> Result<Stats> {
    let counts = store.counts().await?;
    Ok(Stats {
        documents: counts.documents,
        chunks: counts.chunks,
        vectors: counts.vectors,
        live_sessions: sessions.map(|s| s.live_count()).unwrap_or(0),
        embedding_model: embedding_model.to_string(),
        generation_model: generation_model.to_string(),
    })
}

impl Stats {
    /// One-line summary used for SMS/WhatsApp `stats` replies.
    pub fn short_text(&self) -> String {
        format!(
            "Knowledge base: {} documents, {} chunks indexed.",
            self.documents, self.chunks
        )
    }
}
