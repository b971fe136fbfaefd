//! Embedding client abstraction and implementations.
//!
//! Defines the [`Embedder`] trait plus concrete backends:
//! - **[`DisabledEmbedder`]** — returns errors; used when embeddings are not configured.
//! - **[`OpenAiEmbedder`]** — calls the OpenAI embeddings API with retry and backoff.
//! - **[`OllamaEmbedder`]** — calls a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalEmbedder`** — runs the model in process via fastembed (feature `local-embeddings`).
//!
//! Timeout and retry count are explicit configuration on this boundary so
//! tests can inject failing or slow fakes deterministically.
//!
//! Retry strategy for the HTTP backends:
//! - HTTP 429 and 5xx → retry with exponential backoff (1s, 2s, 4s, …, capped)
//! - other 4xx → fail immediately
//! - network error / timeout → retry
//!
//! Also provides the vector utilities shared by both store backends:
//! [`cosine_similarity`], [`vec_to_blob`], [`blob_to_vec`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Maps text to a fixed-size numeric vector.
///
/// Object safe; the engine and the ingestor hold an `Arc<dyn Embedder>`.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let results = embedder.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

/// Create the configured [`Embedder`].
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Backoff delay before retry `attempt` (1-based): 1s, 2s, 4s, …, capped at 32s.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

// ============ Disabled ============

/// A no-op embedder that always returns errors.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI ============

/// Embedding client for the OpenAI embeddings API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    timeout_secs: u64,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }
        Ok(Self {
            model,
            dims,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_openai_embeddings(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

fn parse_openai_embeddings(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        embeddings.push(
            embedding
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }
    Ok(embeddings)
}

// ============ Ollama ============

/// Embedding client for a local Ollama instance (`POST /api/embed`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Ok(Self {
            model,
            dims,
            url,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = client
                .post(format!("{}/api/embed", self.url))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_ollama_embeddings(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("Ollama API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Ollama API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Ollama embedding failed after retries")))
    }
}

fn parse_ollama_embeddings(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());
    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: embedding is not an array"))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }
    Ok(result)
}

// ============ Local (fastembed) ============

/// In-process embedder via fastembed. The model is downloaded on first use
/// and cached; after that no network calls are needed.
#[cfg(feature = "local-embeddings")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
}

#[cfg(feature = "local-embeddings")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        let dims = config.dims.unwrap_or(match model_name.as_str() {
            "all-minilm-l6-v2" | "bge-small-en-v1.5" => 384,
            "bge-base-en-v1.5" | "nomic-embed-text-v1.5" => 768,
            _ => 384,
        });
        Ok(Self { model_name, dims })
    }

    fn fastembed_model(&self) -> Result<fastembed::EmbeddingModel> {
        match self.model_name.as_str() {
            "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
            other => bail!(
                "Unknown local embedding model: '{}'. Supported models: \
                 all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, nomic-embed-text-v1.5",
                other
            ),
        }
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let fastembed_model = self.fastembed_model()?;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(false),
            )
            .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

            model
                .embed(texts, None)
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors of
/// different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_empty_or_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
        assert_eq!(backoff_delay(40), Duration::from_secs(32));
    }

    #[test]
    fn parse_openai_shape() {
        let json = serde_json::json!({
            "data": [
                { "embedding": [0.1, 0.2] },
                { "embedding": [0.3, 0.4] }
            ]
        });
        let out = parse_openai_embeddings(&json).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].len(), 2);
    }
}
