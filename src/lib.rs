//! # Ragline
//!
//! A retrieval-augmented knowledge-base assistant with multi-channel
//! conversation support.
//!
//! Ragline ingests documents (text, markdown, PDF), chunks and embeds them
//! into a SQLite-backed vector index, and answers questions grounded in
//! that index through a single query engine shared by a CLI, a JSON HTTP
//! API, and webhook adapters for voice calls, SMS, WhatsApp, and chat.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌───────────┐
//! │ Documents │──▶│   Pipeline    │──▶│  SQLite   │
//! │ txt/md/pdf│   │ Chunk+Embed  │   │ vectors   │
//! └───────────┘   └──────────────┘   └─────┬─────┘
//!                                          │
//!            ┌──────────┬──────────────────┤
//!            ▼          ▼                  ▼
//!       ┌────────┐ ┌─────────┐   ┌──────────────────┐
//!       │  CLI   │ │  HTTP   │   │ Channel webhooks │
//!       │(ragline)│ │ (JSON)  │   │ voice/sms/chat   │
//!       └────────┘ └─────────┘   └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragline init                          # create database
//! ragline ingest ./docs                 # ingest a directory
//! ragline query "how do I deploy?"      # one-shot question
//! ragline serve                         # webhooks + JSON API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed query/ingest error taxonomy |
//! | [`db`] | SQLite connection and migrations |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Knowledge store trait + SQLite/in-memory backends |
//! | [`ingest`] | Document ingestion pipeline |
//! | [`retrieve`] | Vector retrieval with relevance floor |
//! | [`compose`] | Grounded prompt composition |
//! | [`generation`] | Chat-completions client |
//! | [`engine`] | The retrieve → compose → generate query engine |
//! | [`session`] | Per-identity conversation sessions |
//! | [`channels`] | Voice / SMS / WhatsApp / chat webhook adapters |
//! | [`stats`] | Knowledge-base statistics |
//! | [`server`] | HTTP server |

pub mod channels;
pub mod chunk;
pub mod compose;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generation;
pub mod ingest;
pub mod models;
pub mod retrieve;
pub mod server;
pub mod session;
pub mod stats;
pub mod store;
