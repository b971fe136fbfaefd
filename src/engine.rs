//! The query engine: retrieve → compose → generate.
//!
//! One turn in, one answer out. The engine never touches session state —
//! callers own their history and append turns themselves — so the same
//! engine instance serves every channel adapter and the CLI concurrently.

use std::sync::Arc;

use serde::Serialize;

use crate::compose::{compose, ComposedPrompt};
use crate::config::PromptConfig;
use crate::error::QueryError;
use crate::generation::Generator;
use crate::models::Turn;
use crate::retrieve::Retriever;

/// Where an answer's grounding came from, for citation display.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub document_id: String,
    pub source_name: String,
    pub chunk_id: String,
    pub score: f32,
}

/// A completed query turn.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceRef>,
    /// False when the answer came from the model's general knowledge
    /// because nothing in the knowledge base cleared the relevance floor.
    pub grounded: bool,
}

impl Answer {
    /// Distinct source names in score order. Chunks from the same document
    /// can interleave with other documents in the ranking, so adjacent
    /// dedup is not enough.
    pub fn source_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for source in &self.sources {
            if !names.contains(&source.source_name.as_str()) {
                names.push(source.source_name.as_str());
            }
        }
        names
    }
}

pub struct QueryEngine {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    prompt: PromptConfig,
}

impl QueryEngine {
    pub fn new(retriever: Retriever, generator: Arc<dyn Generator>, prompt: PromptConfig) -> Self {
        Self {
            retriever,
            generator,
            prompt,
        }
    }

    /// Answer `question` in the context of `history` (most recent turn last).
    ///
    /// An empty retrieval result is not a failure: the prompt switches to
    /// its ungrounded branch and the model still answers. Only an unreachable
    /// embedding/index ([`QueryError::RetrievalUnavailable`]) or generation
    /// backend ([`QueryError::GenerationUnavailable`]) surfaces as an error.
    pub async fn answer(&self, question: &str, history: &[Turn]) -> Result<Answer, QueryError> {
        let chunks = self.retriever.retrieve(question).await?;

        tracing::debug!(
            retrieved = chunks.len(),
            top_score = chunks.first().map(|c| c.score),
            "composing prompt"
        );

        let prompt: ComposedPrompt = compose(question, &chunks, history, &self.prompt);

        let text = self
            .generator
            .complete(&prompt.system, &prompt.user)
            .await
            .map_err(QueryError::GenerationUnavailable)?;

        let sources = chunks
            .iter()
            .map(|c| SourceRef {
                document_id: c.document_id.clone(),
                source_name: c.source_name.clone(),
                chunk_id: c.chunk_id.clone(),
                score: c.score,
            })
            .collect();

        Ok(Answer {
            text,
            sources,
            grounded: prompt.grounded,
        })
    }
}
