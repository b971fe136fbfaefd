//! End-to-end pipeline tests: ingest → retrieve → compose → generate,
//! running against the real SQLite store in a temp directory.

mod common;

use std::sync::Arc;

use ragline::config::{ChunkingConfig, PromptConfig, RetrievalConfig};
use ragline::db;
use ragline::embedding::Embedder;
use ragline::engine::QueryEngine;
use ragline::error::QueryError;
use ragline::ingest::{IngestOutcome, Ingestor};
use ragline::retrieve::Retriever;
use ragline::store::sqlite::SqliteStore;
use ragline::store::KnowledgeStore;

use common::{BagOfWordsEmbedder, FailingGenerator, ScriptedGenerator};

async fn sqlite_store(dir: &tempfile::TempDir) -> Arc<dyn KnowledgeStore> {
    let pool = db::connect(&dir.path().join("ragline.db")).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    Arc::new(SqliteStore::new(pool))
}

fn ingestor(store: Arc<dyn KnowledgeStore>) -> Ingestor {
    Ingestor::new(
        store,
        Arc::new(BagOfWordsEmbedder),
        ChunkingConfig {
            max_chars: 300,
            overlap_chars: 40,
            boundary_window: 60,
        },
    )
}

fn engine(store: Arc<dyn KnowledgeStore>, generator: Arc<ScriptedGenerator>) -> QueryEngine {
    QueryEngine::new(
        Retriever::new(
            store,
            Arc::new(BagOfWordsEmbedder),
            RetrievalConfig {
                top_k: 4,
                min_score: 0.25,
            },
        ),
        generator,
        PromptConfig {
            max_chars: 6000,
            history_turns: 6,
        },
    )
}

#[tokio::test]
async fn ingest_then_query_grounds_the_answer() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir).await;

    let outcome = ingestor(store.clone())
        .ingest_text(
            "geography.txt",
            "text/plain",
            "The capital of France is Paris. Paris sits on the Seine river. \
             The capital of Spain is Madrid, and the capital of Italy is Rome.",
        )
        .await
        .unwrap();
    let IngestOutcome::Ingested { document_id, .. } = outcome else {
        panic!("expected ingest");
    };

    let generator = ScriptedGenerator::new("The capital of France is Paris.");
    let answer = engine(store, generator.clone())
        .answer("What is the capital of France?", &[])
        .await
        .unwrap();

    assert!(answer.grounded);
    assert!(answer.sources.iter().any(|s| s.document_id == document_id));
    assert!(answer
        .sources
        .iter()
        .all(|s| s.source_name == "geography.txt"));
    assert_eq!(answer.text, "The capital of France is Paris.");

    // The retrieved context actually reached the model.
    let prompts = generator.prompts.lock().unwrap();
    assert!(prompts[0].0.contains("capital of France"));
    assert!(prompts[0].0.contains("[Source: geography.txt]"));
}

#[tokio::test]
async fn empty_knowledge_base_degrades_instead_of_failing() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir).await;

    let generator = ScriptedGenerator::new("I don't have documents about that.");
    let answer = engine(store, generator.clone())
        .answer("What is the capital of France?", &[])
        .await
        .unwrap();

    assert!(!answer.grounded);
    assert!(answer.sources.is_empty());

    let prompts = generator.prompts.lock().unwrap();
    assert!(prompts[0].0.contains("No knowledge-base context matched"));
}

#[tokio::test]
async fn irrelevant_documents_stay_below_the_floor() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir).await;

    ingestor(store.clone())
        .ingest_text(
            "noise.txt",
            "text/plain",
            "zylophone quark blorp vrex entirely unrelated nonsense tokens",
        )
        .await
        .unwrap();

    let generator = ScriptedGenerator::new("answer");
    let answer = engine(store, generator)
        .answer("What is the capital of France?", &[])
        .await
        .unwrap();

    assert!(!answer.grounded);
    assert!(answer.sources.is_empty());
}

#[tokio::test]
async fn reingest_is_deduplicated_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let text = "Shared content that gets ingested twice.";

    {
        let store = sqlite_store(&dir).await;
        let outcome = ingestor(store)
            .ingest_text("a.txt", "text/plain", text)
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Ingested { .. }));
    }

    // Fresh pool over the same database file.
    let store = sqlite_store(&dir).await;
    let outcome = ingestor(store.clone())
        .ingest_text("b.txt", "text/plain", text)
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Duplicate { .. }));
    assert_eq!(store.counts().await.unwrap().documents, 1);
}

#[tokio::test]
async fn delete_document_cascades_to_chunks_and_vectors() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir).await;

    let outcome = ingestor(store.clone())
        .ingest_text(
            "doomed.txt",
            "text/plain",
            &"A sentence that repeats for chunking purposes. ".repeat(20),
        )
        .await
        .unwrap();
    let IngestOutcome::Ingested { document_id, .. } = outcome else {
        panic!("expected ingest");
    };

    let before = store.counts().await.unwrap();
    assert!(before.chunks > 1);

    store.delete_document(&document_id).await.unwrap();
    let after = store.counts().await.unwrap();
    assert_eq!(after.documents, 0);
    assert_eq!(after.chunks, 0);
    assert_eq!(after.vectors, 0);
}

#[tokio::test]
async fn generation_outage_is_a_typed_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir).await;

    ingestor(store.clone())
        .ingest_text("facts.txt", "text/plain", "The capital of France is Paris.")
        .await
        .unwrap();

    let engine = QueryEngine::new(
        Retriever::new(
            store,
            Arc::new(BagOfWordsEmbedder),
            RetrievalConfig {
                top_k: 4,
                min_score: 0.25,
            },
        ),
        Arc::new(FailingGenerator),
        PromptConfig {
            max_chars: 6000,
            history_turns: 6,
        },
    );

    let err = engine
        .answer("What is the capital of France?", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::GenerationUnavailable(_)));
}

#[tokio::test]
async fn retrieval_results_are_ordered_and_capped() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir).await;

    let ing = ingestor(store.clone());
    for (name, text) in [
        ("a.txt", "France Paris capital city landmarks"),
        ("b.txt", "France capital Paris"),
        ("c.txt", "cooking recipes pasta tomato"),
        ("d.txt", "Paris France capital of the country"),
    ] {
        ing.ingest_text(name, "text/plain", text).await.unwrap();
    }

    let retriever = Retriever::new(
        store,
        Arc::new(BagOfWordsEmbedder),
        RetrievalConfig {
            top_k: 2,
            min_score: 0.1,
        },
    );
    let results = retriever
        .retrieve("What is the capital of France? Paris?")
        .await
        .unwrap();

    assert!(results.len() <= 2);
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert!(results.iter().all(|r| r.source_name != "c.txt"));
}
