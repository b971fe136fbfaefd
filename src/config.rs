use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
    /// How far back from `max_chars` the chunker may look for a sentence or
    /// whitespace boundary before falling back to a hard cut.
    #[serde(default = "default_boundary_window")]
    pub boundary_window: usize,
}

fn default_overlap_chars() -> usize {
    200
}
fn default_boundary_window() -> usize {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Relevance floor: results scoring below this are dropped.
    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: default_min_score(),
        }
    }
}

fn default_top_k() -> usize {
    4
}
fn default_min_score() -> f32 {
    0.25
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    /// Character budget for the composed prompt (system + history + question).
    #[serde(default = "default_prompt_max_chars")]
    pub max_chars: usize,
    /// How many of the most recent conversation turns to include.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_chars: default_prompt_max_chars(),
            history_turns: default_history_turns(),
        }
    }
}

fn default_prompt_max_chars() -> usize {
    6000
}
fn default_history_turns() -> usize {
    6
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// OpenAI-compatible chat-completions endpoint base URL.
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_generation_base_url(),
            model: default_generation_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_generation_retries(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_generation_base_url() -> String {
    "https://router.huggingface.co/v1".to_string()
}
fn default_generation_model() -> String {
    "openai/gpt-oss-20b:fireworks-ai".to_string()
}
fn default_max_tokens() -> u32 {
    300
}
fn default_temperature() -> f32 {
    0.7
}
fn default_generation_retries() -> u32 {
    1
}
fn default_api_key_env() -> String {
    "HUGGINGFACE_API_TOKEN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionsConfig {
    /// Seconds of silence before an active session becomes idle.
    #[serde(default = "default_idle_after_secs")]
    pub idle_after_secs: u64,
    /// Seconds of silence before a session is reaped entirely.
    #[serde(default = "default_expire_after_secs")]
    pub expire_after_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Hard cap on per-session history; oldest turns are dropped.
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_after_secs: default_idle_after_secs(),
            expire_after_secs: default_expire_after_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_history_turns: default_max_history_turns(),
        }
    }
}

fn default_idle_after_secs() -> u64 {
    300
}
fn default_expire_after_secs() -> u64 {
    900
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_max_history_turns() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub slack: SlackConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VoiceConfig {
    /// Transcripts with confidence below this count as recognition failures.
    #[serde(default = "default_low_confidence_floor")]
    pub low_confidence_floor: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            low_confidence_floor: default_low_confidence_floor(),
        }
    }
}

fn default_low_confidence_floor() -> f32 {
    0.4
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlackConfig {
    /// Environment variable holding the Slack signing secret.
    #[serde(default = "default_signing_secret_env")]
    pub signing_secret_env: String,
    /// Environment variable holding the bot token (used to download shared files).
    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            signing_secret_env: default_signing_secret_env(),
            bot_token_env: default_bot_token_env(),
        }
    }
}

fn default_signing_secret_env() -> String {
    "SLACK_SIGNING_SECRET".to_string()
}
fn default_bot_token_env() -> String {
    "SLACK_BOT_TOKEN".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.min_score) {
        anyhow::bail!("retrieval.min_score must be in [-1.0, 1.0]");
    }

    if config.prompt.max_chars == 0 {
        anyhow::bail!("prompt.max_chars must be > 0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    if config.sessions.expire_after_secs < config.sessions.idle_after_secs {
        anyhow::bail!("sessions.expire_after_secs must be >= sessions.idle_after_secs");
    }

    Ok(config)
}
