//! Chat webhook adapter (Slack Events API).
//!
//! Every request is authenticated with the signing-secret HMAC before any
//! parsing. The events endpoint must acknowledge within Slack's deadline,
//! so mention handling and file ingestion run in a spawned task and the
//! handler returns 200 immediately; replies go out through the Web API.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::channels::failure_reply;
use crate::models::Role;
use crate::server::{AppError, AppState};
use crate::session::Channel;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted clock skew on the request timestamp; older requests
/// are treated as replays.
const MAX_SKEW_SECS: i64 = 300;

/// Verify Slack's `v0=` request signature against the raw body.
pub fn verify_signature(
    signing_secret: &str,
    timestamp: &str,
    signature: &str,
    body: &str,
    now_epoch: i64,
) -> bool {
    let Ok(ts) = timestamp.parse::<i64>() else {
        return false;
    };
    if (now_epoch - ts).abs() > MAX_SKEW_SECS {
        return false;
    }

    let Some(sig_hex) = signature.strip_prefix("v0=") else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(signing_secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("v0:{}:{}", ts, body).as_bytes());
    mac.verify_slice(&sig_bytes).is_ok()
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    challenge: Option<String>,
    #[serde(default)]
    event: Option<serde_json::Value>,
}

/// `POST /slack/events`
pub async fn events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, AppError> {
    let secret = std::env::var(&state.slack_config.signing_secret_env).unwrap_or_default();
    if secret.is_empty() {
        tracing::warn!("chat channel not configured; rejecting event");
        return Ok(StatusCode::SERVICE_UNAVAILABLE.into_response());
    }

    let timestamp = header_str(&headers, "x-slack-request-timestamp");
    let signature = header_str(&headers, "x-slack-signature");
    let now = chrono::Utc::now().timestamp();

    if !verify_signature(&secret, timestamp, signature, &body, now) {
        tracing::warn!("rejected chat event with bad signature");
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    }

    let envelope: EventEnvelope =
        serde_json::from_str(&body).map_err(|e| AppError::bad_request(e.to_string()))?;

    match envelope.kind.as_str() {
        "url_verification" => {
            let challenge = envelope.challenge.unwrap_or_default();
            Ok(challenge.into_response())
        }
        "event_callback" => {
            if let Some(event) = envelope.event {
                // Ack now; the reply goes out over the Web API.
                tokio::spawn(handle_event(state, event));
            }
            Ok(StatusCode::OK.into_response())
        }
        other => {
            tracing::debug!(kind = other, "ignoring event envelope");
            Ok(StatusCode::OK.into_response())
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

async fn handle_event(state: AppState, event: serde_json::Value) {
    let kind = event.get("type").and_then(|t| t.as_str()).unwrap_or("");
    match kind {
        "app_mention" => handle_mention(state, &event).await,
        "file_shared" => handle_file_shared(state, &event).await,
        other => tracing::debug!(kind = other, "ignoring chat event"),
    }
}

async fn handle_mention(state: AppState, event: &serde_json::Value) {
    let text = event.get("text").and_then(|t| t.as_str()).unwrap_or("");
    let channel_id = event.get("channel").and_then(|c| c.as_str()).unwrap_or("");
    if channel_id.is_empty() {
        return;
    }

    let question = strip_mentions(text);
    if question.is_empty() {
        post_message(&state, channel_id, "Ask me a question and I'll answer from the knowledge base.").await;
        return;
    }

    // One session per chat channel, so a thread of mentions stays coherent.
    let mut session = state.sessions.checkout(Channel::Chat, channel_id).await;
    let (turn_text, reply) = match state.engine.answer(&question, &session.history).await {
        Ok(answer) => {
            let reply = if answer.grounded {
                format!(
                    "{}\n_Sources: {}_",
                    answer.text,
                    answer.source_names().join(", ")
                )
            } else {
                answer.text.clone()
            };
            (answer.text, reply)
        }
        Err(e) => {
            tracing::warn!(channel_id, error = %e, "query turn failed");
            let apology = failure_reply(&e).to_string();
            (apology.clone(), apology)
        }
    };
    session.append_turn(Role::User, question);
    session.append_turn(Role::Assistant, turn_text);
    drop(session);

    post_message(&state, channel_id, &reply).await;
}

async fn handle_file_shared(state: AppState, event: &serde_json::Value) {
    let file_id = event.get("file_id").and_then(|f| f.as_str()).unwrap_or("");
    let channel_id = event
        .get("channel_id")
        .and_then(|c| c.as_str())
        .unwrap_or("");
    if file_id.is_empty() {
        return;
    }

    match ingest_shared_file(&state, file_id).await {
        Ok(summary) => {
            if !channel_id.is_empty() {
                post_message(&state, channel_id, &summary).await;
            }
        }
        Err(e) => {
            tracing::warn!(file_id, error = %e, "file ingest failed");
            if !channel_id.is_empty() {
                post_message(&state, channel_id, "I couldn't read that file, sorry.").await;
            }
        }
    }
}

async fn ingest_shared_file(state: &AppState, file_id: &str) -> anyhow::Result<String> {
    let token = std::env::var(&state.slack_config.bot_token_env)?;
    let client = reqwest::Client::new();

    let info: serde_json::Value = client
        .get("https://slack.com/api/files.info")
        .bearer_auth(&token)
        .query(&[("file", file_id)])
        .send()
        .await?
        .json()
        .await?;

    let file = info
        .get("file")
        .ok_or_else(|| anyhow::anyhow!("files.info returned no file"))?;
    let name = file
        .get("name")
        .and_then(|n| n.as_str())
        .unwrap_or("shared-file");
    let mimetype = file
        .get("mimetype")
        .and_then(|m| m.as_str())
        .unwrap_or("text/plain");
    let url = file
        .get("url_private_download")
        .and_then(|u| u.as_str())
        .ok_or_else(|| anyhow::anyhow!("file has no download url"))?;

    if !mimetype.starts_with("text/") {
        anyhow::bail!("unsupported file type {}", mimetype);
    }

    let content = client
        .get(url)
        .bearer_auth(&token)
        .send()
        .await?
        .text()
        .await?;

    use crate::ingest::IngestOutcome;
    match state.ingestor.ingest_text(name, mimetype, &content).await? {
        IngestOutcome::Ingested { chunks, .. } => Ok(format!(
            "Added *{}* to the knowledge base ({} chunks).",
            name, chunks
        )),
        IngestOutcome::Duplicate { .. } => {
            Ok(format!("*{}* is already in the knowledge base.", name))
        }
    }
}

async fn post_message(state: &AppState, channel_id: &str, text: &str) {
    let Ok(token) = std::env::var(&state.slack_config.bot_token_env) else {
        tracing::warn!("bot token not set; dropping chat reply");
        return;
    };

    let body = serde_json::json!({ "channel": channel_id, "text": text });
    let result = reqwest::Client::new()
        .post("https://slack.com/api/chat.postMessage")
        .bearer_auth(&token)
        .json(&body)
        .send()
        .await;

    match result {
        Ok(resp) if resp.status().is_success() => {}
        Ok(resp) => tracing::warn!(status = %resp.status(), "chat reply rejected"),
        Err(e) => tracing::warn!(error = %e, "chat reply failed"),
    }
}

/// Strip `<@U…>` mention tags, leaving the question text.
fn strip_mentions(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<@") {
        out.push_str(&rest[..start]);
        match rest[start..].find('>') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
