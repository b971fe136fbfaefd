//! Text-generation client abstraction.
//!
//! The [`Generator`] trait is the engine's seam to the language model; the
//! production implementation, [`ChatCompletionsGenerator`], talks to any
//! OpenAI-compatible chat-completions endpoint (OpenAI itself, the Hugging
//! Face router, a local vLLM, …). Timeout and retry count come from
//! configuration so tests can substitute failing or slow fakes.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::GenerationConfig;

/// Stateless text completion: system prompt + user message in, answer out.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String>;
}

/// Client for an OpenAI-compatible `POST {base_url}/chat/completions`.
pub struct ChatCompletionsGenerator {
    config: GenerationConfig,
}

impl ChatCompletionsGenerator {
    pub fn new(config: GenerationConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String> {
        let api_key = std::env::var(&self.config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", self.config.api_key_env))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_message }
            ],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(&url)
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
                        return parse_completion(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Generation API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Generation API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Generation failed after retries")))
    }
}

/// Extract `choices[0].message.content`; an empty or missing completion is
/// an error, not an empty answer.
fn parse_completion(json: &serde_json::Value) -> Result<String> {
    let content = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string());

    match content {
        Some(text) if !text.is_empty() => Ok(text),
        _ => bail!("Empty completion from generation API"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_completion_content() {
        let json = serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "  Paris.  " } }
            ]
        });
        assert_eq!(parse_completion(&json).unwrap(), "Paris.");
    }

    #[test]
    fn empty_completion_is_an_error() {
        let json = serde_json::json!({ "choices": [ { "message": { "content": "   " } } ] });
        assert!(parse_completion(&json).is_err());

        let json = serde_json::json!({ "choices": [] });
        assert!(parse_completion(&json).is_err());
    }
}
