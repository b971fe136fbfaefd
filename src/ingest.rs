//! Document ingestion: file or raw text → chunks → vectors → store.
//!
//! Each document is deduplicated by a content hash before any embedding
//! work happens; re-ingesting identical bytes is a cheap no-op. A document
//! and all of its chunks/vectors land in the store atomically, so a failed
//! ingest leaves no partial document behind.

use anyhow::Result;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunk::chunk_text;
use crate::config::ChunkingConfig;
use crate::embedding::Embedder;
use crate::error::IngestError;
use crate::models::Document;
use crate::store::KnowledgeStore;

/// Outcome of a single-document ingest.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// Stored with this many chunks.
    Ingested { document_id: String, chunks: usize },
    /// Identical content was already in the store.
    Duplicate { existing_document_id: String },
}

/// Summary of a directory ingest.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub ingested: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: Vec<(String, String)>,
}

pub struct Ingestor {
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            chunking,
        }
    }

    /// Ingest raw text under a caller-supplied source name.
    pub async fn ingest_text(
        &self,
        source_name: &str,
        content_type: &str,
        text: &str,
    ) -> Result<IngestOutcome, IngestError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(IngestError::EmptyDocument);
        }

        let dedup_hash = hex::encode(Sha256::digest(trimmed.as_bytes()));
        if let Some(existing) = self
            .store
            .find_by_dedup_hash(&dedup_hash)
            .await
            .map_err(IngestError::Store)?
        {
            tracing::info!(source = source_name, "skipping duplicate document");
            return Ok(IngestOutcome::Duplicate {
                existing_document_id: existing,
            });
        }

        let document_id = Uuid::new_v4().to_string();
        let chunks = chunk_text(&document_id, trimmed, &self.chunking);
        if chunks.is_empty() {
            return Err(IngestError::EmptyDocument);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .map_err(IngestError::EmbeddingUnavailable)?;

        let doc = Document {
            id: document_id.clone(),
            source_name: source_name.to_string(),
            content_type: content_type.to_string(),
            raw_text: trimmed.to_string(),
            upload_time: Utc::now().timestamp(),
            dedup_hash,
        };

        self.store
            .insert_document(&doc, &chunks, &vectors)
            .await
            .map_err(IngestError::Store)?;

        tracing::info!(
            source = source_name,
            document_id = %document_id,
            chunks = chunks.len(),
            "ingested document"
        );

        Ok(IngestOutcome::Ingested {
            document_id,
            chunks: chunks.len(),
        })
    }

    /// Ingest one file. Plain text and markdown are read as UTF-8; PDFs go
    /// through text extraction. Anything else is rejected as unreadable.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestOutcome, IngestError> {
        let source_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let (content_type, text) = match ext.as_str() {
            "txt" | "md" | "markdown" => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| IngestError::Unreadable(format!("{}: {}", path.display(), e)))?;
                let ct = if ext == "txt" {
                    "text/plain"
                } else {
                    "text/markdown"
                };
                (ct, text)
            }
            "pdf" => {
                let text = extract_pdf_text(path)?;
                ("application/pdf", text)
            }
            other => {
                return Err(IngestError::Unreadable(format!(
                    "{}: unsupported file type '.{}'",
                    path.display(),
                    other
                )));
            }
        };

        self.ingest_text(&source_name, content_type, &text).await
    }

    /// Walk a directory and ingest every supported file in it. Unsupported
    /// extensions are counted as skipped, not failed.
    pub async fn ingest_dir(&self, dir: &Path) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if !matches!(ext.as_str(), "txt" | "md" | "markdown" | "pdf") {
                report.skipped += 1;
                continue;
            }

            match self.ingest_file(path).await {
                Ok(IngestOutcome::Ingested { .. }) => report.ingested += 1,
                Ok(IngestOutcome::Duplicate { .. }) => report.duplicates += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ingest failed");
                    report.failed.push((path.display().to_string(), e.to_string()));
                }
            }
        }

        Ok(report)
    }
}

fn extract_pdf_text(path: &Path) -> Result<String, IngestError> {
    let text = pdf_extract::extract_text(path)
        .map_err(|e| IngestError::Unreadable(format!("{}: {}", path.display(), e)))?;
    if text.trim().is_empty() {
        return Err(IngestError::Unreadable(format!(
            "{}: no extractable text",
            path.display()
        )));
    }
    Ok(text)
}
