//! Outbound HTTP clients against local axum servers: URL reachability
//! checks and the retry behaviour of the embedding and chat clients.

use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use connie_rag::config::{ChatConfig, EmbeddingConfig};
use connie_rag::embedding::{Embedder, OpenAiEmbedder};
use connie_rag::error::ErrorKind;
use connie_rag::guardrail::{HttpUrlVerifier, UrlVerifier};
use connie_rag::llm::{ChatModel, ChatOptions, OpenAiChat};
use connie_rag::models::ChatMessage;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// ─── URL verification ───────────────────────────────────────────────

async fn head_rejected(method: Method) -> StatusCode {
    if method == Method::HEAD {
        StatusCode::METHOD_NOT_ALLOWED
    } else {
        StatusCode::OK
    }
}

async fn link_server() -> String {
    let app = Router::new()
        .route("/ok", get(|| async { StatusCode::OK }))
        .route("/get-only", any(head_rejected))
        .route("/gone", get(|| async { StatusCode::NOT_FOUND }))
        .route(
            "/redir",
            get(|| async { (StatusCode::FOUND, [(header::LOCATION, "/ok")]) }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                StatusCode::OK
            }),
        );
    serve(app).await
}

#[tokio::test]
async fn test_verifier_status_rules() {
    let base = link_server().await;
    let verifier = HttpUrlVerifier::new(Duration::from_secs(2)).unwrap();

    assert!(verifier.is_reachable(&format!("{}/ok", base)).await);
    // HEAD refused, GET accepted
    assert!(verifier.is_reachable(&format!("{}/get-only", base)).await);
    assert!(!verifier.is_reachable(&format!("{}/gone", base)).await);
    assert!(verifier.is_reachable(&format!("{}/redir", base)).await);
    // nothing listens on the discard port
    assert!(!verifier.is_reachable("http://127.0.0.1:9/anything").await);
}

#[tokio::test]
async fn test_verifier_gives_up_on_slow_host() {
    let base = link_server().await;
    let verifier = HttpUrlVerifier::new(Duration::from_millis(300)).unwrap();

    let started = Instant::now();
    assert!(!verifier.is_reachable(&format!("{}/slow", base)).await);
    assert!(started.elapsed() < Duration::from_secs(2));
}

// ─── Retries ────────────────────────────────────────────────────────

/// Answers `status` for the first `failures` calls, then `body`.
#[derive(Clone)]
struct Flaky {
    hits: Arc<AtomicUsize>,
    failures: usize,
    status: StatusCode,
    body: Value,
}

impl Flaky {
    fn new(failures: usize, status: StatusCode, body: Value) -> Self {
        Self {
            hits: Arc::new(AtomicUsize::new(0)),
            failures,
            status,
            body,
        }
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn flaky(State(state): State<Flaky>) -> Response {
    let n = state.hits.fetch_add(1, Ordering::SeqCst);
    if n < state.failures {
        (state.status, "busy").into_response()
    } else {
        Json(state.body.clone()).into_response()
    }
}

async fn flaky_server(path: &str, state: Flaky) -> String {
    serve(Router::new().route(path, post(flaky)).with_state(state)).await
}

fn embedding_body() -> Value {
    json!({ "data": [{ "index": 0, "embedding": [0.25, 0.5, 0.75] }] })
}

fn completion_body() -> Value {
    json!({ "choices": [{ "message": { "role": "assistant", "content": " hello " } }] })
}

fn embedder(base_url: String, max_retries: u32) -> OpenAiEmbedder {
    let config = EmbeddingConfig {
        base_url,
        max_retries,
        timeout_secs: 5,
        ..Default::default()
    };
    OpenAiEmbedder::with_api_key(&config, "test-key".to_string()).unwrap()
}

fn chat(base_url: String, max_retries: u32) -> OpenAiChat {
    let config = ChatConfig {
        base_url,
        max_retries,
        timeout_secs: 5,
        ..Default::default()
    };
    OpenAiChat::with_api_key(&config, "test-key".to_string()).unwrap()
}

#[tokio::test]
async fn test_embedder_recovers_after_server_error() {
    let state = Flaky::new(1, StatusCode::SERVICE_UNAVAILABLE, embedding_body());
    let base = flaky_server("/embeddings", state.clone()).await;

    let vectors = embedder(base, 2).embed(&["hello".to_string()]).await.unwrap();
    assert_eq!(vectors, vec![vec![0.25, 0.5, 0.75]]);
    assert_eq!(state.hits(), 2);
}

#[tokio::test]
async fn test_embedder_gives_up_after_max_retries() {
    let state = Flaky::new(usize::MAX, StatusCode::SERVICE_UNAVAILABLE, embedding_body());
    let base = flaky_server("/embeddings", state.clone()).await;

    let err = embedder(base, 1).embed(&["hello".to_string()]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert_eq!(state.hits(), 2);
}

#[tokio::test]
async fn test_embedder_does_not_retry_client_error() {
    let state = Flaky::new(usize::MAX, StatusCode::UNAUTHORIZED, embedding_body());
    let base = flaky_server("/embeddings", state.clone()).await;

    assert!(embedder(base, 3).embed(&["hello".to_string()]).await.is_err());
    assert_eq!(state.hits(), 1);
}

#[tokio::test]
async fn test_chat_recovers_after_rate_limit() {
    let state = Flaky::new(1, StatusCode::TOO_MANY_REQUESTS, completion_body());
    let base = flaky_server("/chat/completions", state.clone()).await;

    let reply = chat(base, 2)
        .complete(&[ChatMessage::user("hi")], ChatOptions::new(0.5))
        .await
        .unwrap();
    assert_eq!(reply, "hello");
    assert_eq!(state.hits(), 2);
}

#[tokio::test]
async fn test_chat_gives_up_after_max_retries() {
    let state = Flaky::new(usize::MAX, StatusCode::TOO_MANY_REQUESTS, completion_body());
    let base = flaky_server("/chat/completions", state.clone()).await;

    let err = chat(base, 1)
        .complete(&[ChatMessage::user("hi")], ChatOptions::new(0.5))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamQuota);
    assert_eq!(state.hits(), 2);
}
