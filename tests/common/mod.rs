//! Shared fakes for integration tests: a deterministic embedder, scripted
//! generators, and an [`AppState`] wired together from in-memory parts.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use ragline::config::{
    ChunkingConfig, PromptConfig, RetrievalConfig, SessionsConfig, SlackConfig, VoiceConfig,
};
use ragline::embedding::Embedder;
use ragline::engine::QueryEngine;
use ragline::generation::Generator;
use ragline::ingest::Ingestor;
use ragline::retrieve::Retriever;
use ragline::server::AppState;
use ragline::session::SessionManager;
use ragline::store::memory::InMemoryStore;
use ragline::store::KnowledgeStore;

/// Deterministic bag-of-words embedder: tokens hash into 64 buckets, so
/// shared vocabulary yields high cosine similarity without any model.
pub struct BagOfWordsEmbedder;

pub fn bow_vector(text: &str) -> Vec<f32> {
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

/// Echoes a fixed reply and records every prompt it receives.
pub struct ScriptedGenerator {
    pub reply: String,
    pub prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedGenerator {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), user_message.to_string()));
        Ok(self.reply.clone())
    }
}

pub struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
        anyhow::bail!("generation backend down")
    }
}

pub fn test_sessions_config() -> SessionsConfig {
    SessionsConfig {
        idle_after_secs: 300,
        expire_after_secs: 900,
        sweep_interval_secs: 60,
        max_history_turns: 10,
    }
}

/// Wire a full [`AppState`] around an in-memory store, the bag-of-words
/// embedder, and the given generator.
pub fn test_app_state(generator: Arc<dyn Generator>) -> (AppState, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let store_dyn: Arc<dyn KnowledgeStore> = store.clone();
    let embedder: Arc<dyn Embedder> = Arc::new(BagOfWordsEmbedder);

    let retriever = Retriever::new(
        Arc::clone(&store_dyn),
        Arc::clone(&embedder),
        RetrievalConfig {
            top_k: 4,
            min_score: 0.25,
        },
    );
    let engine = Arc::new(QueryEngine::new(
        retriever,
        generator,
        PromptConfig {
            max_chars: 6000,
            history_turns: 6,
        },
    ));

    let ingestor = Arc::new(Ingestor::new(
        Arc::clone(&store_dyn),
        embedder,
        ChunkingConfig {
            max_chars: 400,
            overlap_chars: 40,
            boundary_window: 80,
        },
    ));

    let state = AppState {
        store: store_dyn,
        engine,
        sessions: SessionManager::new(test_sessions_config()),
        ingestor,
        voice_config: VoiceConfig::default(),
        slack_config: SlackConfig::default(),
        embedding_model: "bag-of-words".to_string(),
        generation_model: "scripted".to_string(),
    };

    (state, store)
}

/// Read an axum response body to a string.
pub async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
