//! Failure paths: bad input, LLM outages, breaker persistence and reset.

use axum::{http::StatusCode, routing::post, Router};
use herorag::resilience::{CircuitSnapshot, CircuitState};
use herorag::{RagConfig, RagError, RagPipeline};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

async fn spawn_failing_llm(hits: Arc<AtomicUsize>) -> String {
    let app = Router::new().route(
        "/chat",
        post(move || {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                StatusCode::SERVICE_UNAVAILABLE
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/chat")
}

fn config(dir: &TempDir, endpoint: String) -> RagConfig {
    let kb = dir.path().join("kb.json");
    std::fs::write(
        &kb,
        r#"[{"id": "1", "title": "RAG", "text": "Retrieval augmented generation"}]"#,
    )
    .unwrap();

    let mut config = RagConfig::default();
    config.knowledge.path = kb;
    config.embeddings.store_path = dir.path().join("emb.json");
    config.embeddings.compare_store_path = dir.path().join("emb-compare.json");
    config.circuit_breaker.failure_threshold = 2;
    config.circuit_breaker.open_ttl_secs = 600;
    config.circuit_breaker.state_dir = Some(dir.path().join("breakers"));
    config.llm.endpoint = endpoint;
    config.llm.retry.max_retries = 1;
    config.llm.retry.base_delay = std::time::Duration::from_millis(1);
    config
}

#[tokio::test(flavor = "multi_thread")]
async fn blank_question_never_reaches_the_backend() {
    let dir = TempDir::new().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let pipeline =
        RagPipeline::from_config(config(&dir, spawn_failing_llm(hits.clone()).await)).unwrap();

    let err = pipeline.ask().ask(" \t ").await.unwrap_err();
    assert!(matches!(err, RagError::InvalidInput(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn outage_opens_breaker_then_short_circuits() {
    let dir = TempDir::new().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let pipeline =
        RagPipeline::from_config(config(&dir, spawn_failing_llm(hits.clone()).await)).unwrap();

    for _ in 0..2 {
        assert!(matches!(pipeline.ask().ask("rag").await, Err(RagError::Llm(_))));
    }
    // Two failed asks, each retried once.
    assert_eq!(hits.load(Ordering::SeqCst), 4);

    let err = pipeline.ask().ask("rag").await.unwrap_err();
    assert!(matches!(err, RagError::CircuitOpen(_)));
    assert!(err.to_string().contains("temporarily unavailable"));
    assert_eq!(hits.load(Ordering::SeqCst), 4);

    let persisted: CircuitSnapshot = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("breakers/llm.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(persisted.state, CircuitState::Open);
    assert_eq!(persisted.failure_count, 2);
    assert!(persisted.opened_at > 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn open_state_is_shared_through_the_state_file() {
    let dir = TempDir::new().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let endpoint = spawn_failing_llm(hits.clone()).await;

    let first = RagPipeline::from_config(config(&dir, endpoint.clone())).unwrap();
    for _ in 0..2 {
        let _ = first.ask().ask("rag").await;
    }

    // A second pipeline (think: second worker process) sees the open breaker.
    let second = RagPipeline::from_config(config(&dir, endpoint)).unwrap();
    assert!(matches!(
        second.ask().ask("rag").await,
        Err(RagError::CircuitOpen(_))
    ));

    second.llm_breaker().reset();
    assert_eq!(first.llm_breaker().state(), CircuitState::Closed);
    assert!(matches!(first.ask().ask("rag").await, Err(RagError::Llm(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_state_file_reads_as_closed() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("breakers")).unwrap();
    std::fs::write(dir.path().join("breakers/llm.json"), "{not json").unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let pipeline =
        RagPipeline::from_config(config(&dir, spawn_failing_llm(hits).await)).unwrap();
    assert_eq!(pipeline.llm_breaker().state(), CircuitState::Closed);
}

#[test]
fn invalid_breaker_config_is_rejected() {
    let err = RagConfig::from_yaml("circuit_breaker:\n  open_ttl_secs: 0\n").unwrap_err();
    assert!(err.to_string().contains("open_ttl_secs"));
}
