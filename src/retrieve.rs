//! Retrieval: question → embedding → k-nearest chunks above the floor.
//!
//! Embeds the question, asks the store for the top-k neighbors by cosine
//! similarity, and drops anything under `min_score`. An empty result is a
//! normal outcome ("no grounding available"), not an error; errors mean the
//! embedding client or the vector index itself failed.

use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::embedding::{embed_one, Embedder};
use crate::error::QueryError;
use crate::models::RetrievedChunk;
use crate::store::KnowledgeStore;

pub struct Retriever {
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Fetch up to `top_k` chunks relevant to `question`, each scoring at
    /// least `min_score`, ordered by descending score (ties by ascending
    /// chunk id — the store guarantees that ordering).
    pub async fn retrieve(&self, question: &str) -> Result<Vec<RetrievedChunk>, QueryError> {
        if question.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = embed_one(self.embedder.as_ref(), question)
            .await
            .map_err(QueryError::RetrievalUnavailable)?;

        let mut results = self
            .store
            .vector_search(&query_vec, self.config.top_k)
            .await
            .map_err(QueryError::RetrievalUnavailable)?;

        results.retain(|r| r.score >= self.config.min_score);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, Document};
    use crate::store::memory::InMemoryStore;
    use anyhow::Result;
    use async_trait::async_trait;

    /// Deterministic bag-of-words embedder: each token hashes into one of
    /// 64 buckets, so overlapping vocabulary yields high cosine similarity.
    struct BagOfWordsEmbedder;

    fn bow_vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; 64];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut h = 0usize;
            for b in token.bytes() {
                h = h.wrapping_mul(31).wrapping_add(b as usize);
            }
            v[h % 64] += 1.0;
        }
        v
    }

    #[async_trait]
    impl Embedder for BagOfWordsEmbedder {
        fn model_name(&self) -> &str {
            "bag-of-words"
        }
        fn dims(&self) -> usize {
            64
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| bow_vector(t)).collect())
        }
    }

    async fn seed(store: &InMemoryStore, doc_id: &str, chunk_texts: &[&str]) {
        let doc = Document {
            id: doc_id.to_string(),
            source_name: format!("{}.txt", doc_id),
            content_type: "text/plain".to_string(),
            raw_text: chunk_texts.join(" "),
            upload_time: 0,
            dedup_hash: doc_id.to_string(),
        };
        let chunks: Vec<Chunk> = chunk_texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk {
                id: format!("{}-c{}", doc_id, i),
                document_id: doc_id.to_string(),
                chunk_index: i as i64,
                text: t.to_string(),
                hash: String::new(),
            })
            .collect();
        let vectors: Vec<Vec<f32>> = chunk_texts.iter().map(|t| bow_vector(t)).collect();
        store.insert_document(&doc, &chunks, &vectors).await.unwrap();
    }

    fn retriever(store: Arc<InMemoryStore>, top_k: usize, min_score: f32) -> Retriever {
        Retriever::new(
            store,
            Arc::new(BagOfWordsEmbedder),
            RetrievalConfig { top_k, min_score },
        )
    }

    #[tokio::test]
    async fn never_more_than_k_and_all_above_floor() {
        let store = Arc::new(InMemoryStore::new());
        seed(
            &store,
            "d1",
            &[
                "The capital of France is Paris.",
                "France borders Belgium and Spain.",
                "Paris hosts the Louvre museum in France.",
                "Completely unrelated zylophone quark material.",
            ],
        )
        .await;

        let r = retriever(store, 2, 0.2);
        let results = r.retrieve("What is the capital of France?").await.unwrap();

        assert!(results.len() <= 2);
        for res in &results {
            assert!(res.score >= 0.2);
        }
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn empty_when_nothing_clears_floor() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "d1", &["zylophone quark blorp vrex"]).await;

        let r = retriever(store, 4, 0.5);
        let results = r.retrieve("What is the capital of France?").await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn empty_question_returns_empty() {
        let store = Arc::new(InMemoryStore::new());
        let r = retriever(store, 4, 0.0);
        let results = r.retrieve("   ").await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn embedder_failure_is_retrieval_unavailable() {
        struct FailingEmbedder;

        #[async_trait]
        impl Embedder for FailingEmbedder {
            fn model_name(&self) -> &str {
                "failing"
            }
            fn dims(&self) -> usize {
                0
            }
            async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
                anyhow::bail!("connection refused")
            }
        }

        let r = Retriever::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(FailingEmbedder),
            RetrievalConfig {
                top_k: 4,
                min_score: 0.0,
            },
        );
        let err = r.retrieve("anything").await.unwrap_err();
        assert!(matches!(err, QueryError::RetrievalUnavailable(_)));
    }
}
