//! HTTP server: JSON API plus the channel webhooks.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Ask a question (JSON in/out, optional session) |
//! | `POST` | `/ingest` | Ingest raw text into the knowledge base |
//! | `GET`  | `/stats` | Index and session counts |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/voice/incoming` | Voice call start (TwiML) |
//! | `POST` | `/voice/gather` | Voice speech results (TwiML) |
//! | `POST` | `/voice/status` | Voice call lifecycle callback |
//! | `POST` | `/sms` | Inbound SMS (TwiML) |
//! | `POST` | `/whatsapp` | Inbound WhatsApp message (TwiML) |
//! | `POST` | `/slack/events` | Chat events (signed) |
//!
//! # Error Contract
//!
//! JSON endpoints return errors as:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Codes: `bad_request` (400), `retrieval_unavailable` (503),
//! `generation_unavailable` (503), `internal` (500). Webhook endpoints never
//! surface backend failures as HTTP errors; they degrade to an apology in
//! the channel's own reply format so the provider doesn't retry.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted on the JSON API for
//! browser-based clients.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::channels::twiml::TwimlResponse;
use crate::channels::{chat, messaging, voice};
use crate::config::{Config, SlackConfig, VoiceConfig};
use crate::db;
use crate::embedding::create_embedder;
use crate::engine::{Answer, QueryEngine};
use crate::error::{IngestError, QueryError};
use crate::generation::ChatCompletionsGenerator;
use crate::ingest::{IngestOutcome, Ingestor};
use crate::models::Role;
use crate::retrieve::Retriever;
use crate::session::{Channel, SessionManager};
use crate::stats;
use crate::store::sqlite::SqliteStore;
use crate::store::KnowledgeStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KnowledgeStore>,
    pub engine: Arc<QueryEngine>,
    pub sessions: Arc<SessionManager>,
    pub ingestor: Arc<Ingestor>,
    pub voice_config: VoiceConfig,
    pub slack_config: SlackConfig,
    pub embedding_model: String,
    pub generation_model: String,
}

/// Starts the server: opens the store, wires the engine and session
/// manager, spawns the session sweeper, and serves until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(&config.db.path).await?;
    db::run_migrations(&pool).await?;
    let store: Arc<dyn KnowledgeStore> = Arc::new(SqliteStore::new(pool));

    let embedder = create_embedder(&config.embedding)?;
    let embedding_model = embedder.model_name().to_string();

    let retriever = Retriever::new(
        Arc::clone(&store),
        Arc::clone(&embedder),
        config.retrieval.clone(),
    );
    let generator = Arc::new(ChatCompletionsGenerator::new(config.generation.clone()));
    let engine = Arc::new(QueryEngine::new(retriever, generator, config.prompt.clone()));

    let sessions = SessionManager::new(config.sessions.clone());
    sessions.spawn_sweeper();

    let ingestor = Arc::new(Ingestor::new(
        Arc::clone(&store),
        Arc::clone(&embedder),
        config.chunking.clone(),
    ));

    let state = AppState {
        store,
        engine,
        sessions,
        ingestor,
        voice_config: config.channels.voice.clone(),
        slack_config: config.channels.slack.clone(),
        embedding_model,
        generation_model: config.generation.model.clone(),
    };

    let app = build_router(state);

    let bind_addr = &config.server.bind;
    tracing::info!(bind = %bind_addr, "server listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/query", post(handle_query))
        .route("/ingest", post(handle_ingest))
        .route("/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .route("/voice/incoming", post(voice::incoming))
        .route("/voice/gather", post(voice::gather))
        .route("/voice/status", post(voice::status))
        .route("/sms", post(messaging::sms))
        .route("/whatsapp", post(messaging::whatsapp))
        .route("/slack/events", post(chat::events))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into an HTTP response with a JSON body.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request".to_string(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal".to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        let code = match &err {
            QueryError::RetrievalUnavailable(_) => "retrieval_unavailable",
            QueryError::GenerationUnavailable(_) => "generation_unavailable",
        };
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match &err {
            IngestError::EmptyDocument | IngestError::Unreadable(_) => {
                AppError::bad_request(err.to_string())
            }
            IngestError::EmbeddingUnavailable(_) => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "retrieval_unavailable".to_string(),
                message: err.to_string(),
            },
            IngestError::Store(_) => AppError::internal(err.to_string()),
        }
    }
}

/// Render a TwiML body as an HTTP response. Webhook handlers funnel every
/// reply through here so the content type is always right.
pub fn twiml_reply(twiml: TwimlResponse) -> Result<Response, AppError> {
    let xml = twiml.render().map_err(|e| AppError::internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "text/xml")], xml).into_response())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /query ============

#[derive(Deserialize)]
pub struct QueryRequest {
    pub question: String,
    /// Optional caller-chosen conversation id; omitted means stateless.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Handler for `POST /query`.
///
/// With a `session_id`, the turn runs inside an API session (serialized
/// with any concurrent turns for the same id, history included in the
/// prompt). API session ids live in their own namespace; they can never
/// collide with a chat channel's session. Without one, the question is
/// answered statelessly.
pub async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<Answer>, AppError> {
    if req.question.trim().is_empty() {
        return Err(AppError::bad_request("question must not be empty"));
    }

    let answer = match &req.session_id {
        Some(session_id) => {
            let mut session = state.sessions.checkout(Channel::Api, session_id).await;
            let answer = state.engine.answer(&req.question, &session.history).await?;
            session.append_turn(Role::User, req.question.clone());
            session.append_turn(Role::Assistant, answer.text.clone());
            answer
        }
        None => state.engine.answer(&req.question, &[]).await?,
    };

    Ok(Json(answer))
}

// ============ POST /ingest ============

#[derive(Deserialize)]
struct IngestRequest {
    source_name: String,
    #[serde(default = "default_content_type")]
    content_type: String,
    text: String,
}

fn default_content_type() -> String {
    "text/plain".to_string()
}

#[derive(Serialize)]
struct IngestResponse {
    document_id: String,
    chunks: usize,
    duplicate: bool,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    let outcome = state
        .ingestor
        .ingest_text(&req.source_name, &req.content_type, &req.text)
        .await?;

    let resp = match outcome {
        IngestOutcome::Ingested {
            document_id,
            chunks,
        } => IngestResponse {
            document_id,
            chunks,
            duplicate: false,
        },
        IngestOutcome::Duplicate {
            existing_document_id,
        } => IngestResponse {
            document_id: existing_document_id,
            chunks: 0,
            duplicate: true,
        },
    };

    Ok(Json(resp))
}

// ============ GET /stats ============

async fn handle_stats(State(state): State<AppState>) -> Result<Json<stats::Stats>, AppError> {
    let stats = stats::gather(
        &state.store,
        Some(state.sessions.as_ref()),
        &state.embedding_model,
        &state.generation_model,
    )
    .await
    .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(stats))
}
