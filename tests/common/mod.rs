//! In-memory fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use connie_rag::embedding::Embedder;
use connie_rag::error::{RagError, Result};
use connie_rag::guardrail::UrlVerifier;
use connie_rag::index::{InMemoryIndex, QueryRequest, VectorIndex};
use connie_rag::llm::{ChatModel, ChatOptions};
use connie_rag::models::{ChatMessage, IndexStats, QueryMatch, Role, VectorRecord};
use connie_rag::services::Services;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const DIM: usize = 8;

// ─── Embedder ───────────────────────────────────────────────────────

/// Deterministic bag-of-bytes embedding; identical texts get identical
/// vectors and every vector is non-zero.
pub struct FakeEmbedder {
    pub calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

pub fn fake_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    v[0] = 1.0;
    for (i, b) in text.bytes().enumerate() {
        v[(i + b as usize) % DIM] += (b % 7) as f32;
    }
    v
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake-embedder"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| fake_vector(t)).collect())
    }
}

// ─── Index ──────────────────────────────────────────────────────────

/// [`InMemoryIndex`] that counts upserted records and can be told to fail
/// stats calls.
pub struct CountingIndex {
    pub inner: InMemoryIndex,
    pub upserted: AtomicUsize,
    pub fail_stats: bool,
}

impl CountingIndex {
    pub fn new() -> Self {
        Self {
            inner: InMemoryIndex::new(DIM),
            upserted: AtomicUsize::new(0),
            fail_stats: false,
        }
    }

    pub fn upserted(&self) -> usize {
        self.upserted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for CountingIndex {
    async fn describe_stats(&self) -> Result<IndexStats> {
        if self.fail_stats {
            return Err(RagError::Network {
                service: "fake-index",
                message: "connection refused".to_string(),
            });
        }
        self.inner.describe_stats().await
    }

    async fn query(&self, request: &QueryRequest) -> Result<Vec<QueryMatch>> {
        self.inner.query(request).await
    }

    async fn upsert(&self, records: &[VectorRecord], namespace: &str) -> Result<usize> {
        let n = self.inner.upsert(records, namespace).await?;
        self.upserted.fetch_add(n, Ordering::SeqCst);
        Ok(n)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.inner.delete_namespace(namespace).await
    }
}

/// Store `text` in `namespace` with the given source hash.
pub async fn seed(index: &dyn VectorIndex, namespace: &str, id: &str, text: &str, hash: &str) {
    index
        .upsert(
            &[VectorRecord {
                id: id.to_string(),
                values: fake_vector(text),
                metadata: serde_json::json!({
                    "source": "seed.pdf",
                    "chunk_index": 0,
                    "source_hash": hash,
                    "text": text,
                }),
            }],
            namespace,
        )
        .await
        .unwrap();
}

// ─── Chat model ─────────────────────────────────────────────────────

type Responder = Box<dyn Fn(&[ChatMessage]) -> Result<String> + Send + Sync>;

/// Records every request and answers through a closure.
pub struct ScriptedChat {
    responder: Responder,
    pub requests: Mutex<Vec<(Vec<ChatMessage>, ChatOptions)>>,
}

impl ScriptedChat {
    pub fn new(responder: impl Fn(&[ChatMessage]) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Routing requests carry no system message; answers do.
    pub fn support(route: &'static str, answer: &'static str) -> Self {
        Self::new(move |messages| {
            if is_routing(messages) {
                Ok(route.to_string())
            } else {
                Ok(answer.to_string())
            }
        })
    }

    pub fn requests(&self) -> Vec<(Vec<ChatMessage>, ChatOptions)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn routing_calls(&self) -> usize {
        self.requests()
            .iter()
            .filter(|(m, _)| is_routing(m))
            .count()
    }

    pub fn answer_requests(&self) -> Vec<(Vec<ChatMessage>, ChatOptions)> {
        self.requests()
            .into_iter()
            .filter(|(m, _)| !is_routing(m))
            .collect()
    }
}

pub fn is_routing(messages: &[ChatMessage]) -> bool {
    messages.iter().all(|m| m.role != Role::System)
}

#[async_trait]
impl ChatModel for ScriptedChat {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, messages: &[ChatMessage], options: ChatOptions) -> Result<String> {
        self.requests
            .lock()
            .unwrap()
            .push((messages.to_vec(), options));
        (self.responder)(messages)
    }
}

// ─── URL verifier ───────────────────────────────────────────────────

pub struct FakeVerifier {
    pub live: HashSet<String>,
}

impl FakeVerifier {
    pub fn new(live: &[&str]) -> Self {
        Self {
            live: live.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl UrlVerifier for FakeVerifier {
    async fn is_reachable(&self, url: &str) -> bool {
        self.live.contains(url)
    }
}

// ─── Wiring ─────────────────────────────────────────────────────────

pub fn services(
    index: Arc<CountingIndex>,
    chat: Arc<ScriptedChat>,
    verifier: FakeVerifier,
) -> Services {
    Services {
        embedder: Arc::new(FakeEmbedder::new()),
        index,
        chat: chat.clone(),
        companion_chat: chat,
        verifier: Arc::new(verifier),
    }
}
