//! Namespace-partitioned vector index.
//!
//! The [`VectorIndex`] trait covers the four data-plane calls the pipeline
//! needs: stats, query, upsert and namespace deletion. Two backends:
//!
//! - [`PineconeIndex`]: Pinecone's HTTP data plane (`Api-Key` header).
//! - [`InMemoryIndex`]: brute-force cosine search behind a `RwLock`, for
//!   tests and offline runs.
//!
//! | Method | Pinecone endpoint |
//! |--------|-------------------|
//! | [`describe_stats`](VectorIndex::describe_stats) | `POST /describe_index_stats` |
//! | [`query`](VectorIndex::query) | `POST /query` |
//! | [`upsert`](VectorIndex::upsert) | `POST /vectors/upsert` |
//! | [`delete_namespace`](VectorIndex::delete_namespace) | `POST /vectors/delete` |

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::time::Duration;

use crate::config::{IndexConfig, PINECONE_API_KEY_ENV};
use crate::error::{json_or_error, RagError, Result};
use crate::models::{IndexStats, QueryMatch, VectorRecord};

const SERVICE: &str = "vector index";
const PINECONE_API_VERSION: &str = "2024-07";

/// Equality filter on one metadata field.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataFilter {
    pub field: String,
    pub value: serde_json::Value,
}

impl MetadataFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Pinecone filter syntax: `{"field": {"$eq": value}}`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert(
            self.field.clone(),
            serde_json::json!({ "$eq": self.value.clone() }),
        );
        serde_json::Value::Object(obj)
    }

    fn matches(&self, metadata: &serde_json::Value) -> bool {
        metadata.get(&self.field) == Some(&self.value)
    }
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub vector: Vec<f32>,
    pub top_k: usize,
    /// `None` searches the default namespace.
    pub namespace: Option<String>,
    pub filter: Option<MetadataFilter>,
    pub include_metadata: bool,
}

impl QueryRequest {
    pub fn new(vector: Vec<f32>, top_k: usize) -> Self {
        Self {
            vector,
            top_k,
            namespace: None,
            filter: None,
            include_metadata: true,
        }
    }

    pub fn namespace(mut self, namespace: Option<&str>) -> Self {
        self.namespace = namespace.map(|s| s.to_string());
        self
    }

    pub fn filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn without_metadata(mut self) -> Self {
        self.include_metadata = false;
        self
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn describe_stats(&self) -> Result<IndexStats>;

    async fn query(&self, request: &QueryRequest) -> Result<Vec<QueryMatch>>;

    /// Upsert records into a namespace. Returns the upserted count.
    async fn upsert(&self, records: &[VectorRecord], namespace: &str) -> Result<usize>;

    async fn delete_namespace(&self, namespace: &str) -> Result<()>;
}

/// Build the configured index backend.
pub fn create_index(config: &IndexConfig) -> Result<Box<dyn VectorIndex>> {
    match config.provider.as_str() {
        "pinecone" => Ok(Box::new(PineconeIndex::new(config)?)),
        "memory" => Ok(Box::new(InMemoryIndex::new(config.dimension))),
        other => Err(RagError::Config(format!("unknown index provider: {}", other))),
    }
}

// ============ Pinecone ============

pub struct PineconeIndex {
    client: reqwest::Client,
    host: String,
    api_key: String,
}

impl PineconeIndex {
    /// Fails when the host or `PINECONE_API_KEY` is missing.
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let api_key = std::env::var(PINECONE_API_KEY_ENV).map_err(|_| {
            RagError::Config(format!("{} environment variable not set", PINECONE_API_KEY_ENV))
        })?;
        let host = config.resolved_host().ok_or_else(|| {
            RagError::Config("index.host (or PINECONE_INDEX_HOST) must be set".to_string())
        })?;
        Self::with_credentials(config, host, api_key)
    }

    pub fn with_credentials(config: &IndexConfig, host: String, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("https://{}", host)
        };

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(format!("{}{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| RagError::from_reqwest(SERVICE, e))?;
        json_or_error(SERVICE, response).await
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn describe_stats(&self) -> Result<IndexStats> {
        let json = self
            .post("/describe_index_stats", &serde_json::json!({}))
            .await?;
        parse_stats(&json)
    }

    async fn query(&self, request: &QueryRequest) -> Result<Vec<QueryMatch>> {
        let mut body = serde_json::json!({
            "vector": request.vector,
            "topK": request.top_k,
            "includeMetadata": request.include_metadata,
            "includeValues": false,
        });
        if let Some(ns) = &request.namespace {
            body["namespace"] = serde_json::json!(ns);
        }
        if let Some(filter) = &request.filter {
            body["filter"] = filter.to_json();
        }

        let json = self.post("/query", &body).await?;
        parse_matches(&json)
    }

    async fn upsert(&self, records: &[VectorRecord], namespace: &str) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let body = serde_json::json!({
            "vectors": records,
            "namespace": namespace,
        });
        let json = self.post("/vectors/upsert", &body).await?;
        Ok(json
            .get("upsertedCount")
            .and_then(|c| c.as_u64())
            .map(|c| c as usize)
            .unwrap_or(records.len()))
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        let body = serde_json::json!({
            "deleteAll": true,
            "namespace": namespace,
        });
        self.post("/vectors/delete", &body).await?;
        Ok(())
    }
}

pub fn parse_stats(json: &serde_json::Value) -> Result<IndexStats> {
    let namespaces = match json.get("namespaces") {
        Some(serde_json::Value::Object(map)) => map
            .iter()
            .map(|(name, info)| {
                let count = info
                    .get("vectorCount")
                    .and_then(|c| c.as_u64())
                    .unwrap_or(0);
                (name.clone(), count)
            })
            .collect(),
        Some(serde_json::Value::Null) | None => BTreeMap::new(),
        Some(_) => return Err(RagError::parse(SERVICE, "namespaces is not an object")),
    };

    Ok(IndexStats {
        dimension: json.get("dimension").and_then(|d| d.as_u64()).unwrap_or(0) as usize,
        total_vector_count: json
            .get("totalVectorCount")
            .and_then(|c| c.as_u64())
            .unwrap_or(0),
        namespaces,
    })
}

pub fn parse_matches(json: &serde_json::Value) -> Result<Vec<QueryMatch>> {
    match json.get("matches") {
        Some(matches) => serde_json::from_value(matches.clone())
            .map_err(|e| RagError::parse(SERVICE, e.to_string())),
        None => Ok(Vec::new()),
    }
}

// ============ In-memory ============

struct StoredVector {
    values: Vec<f32>,
    metadata: serde_json::Value,
}

/// In-memory index keyed by namespace, then vector id.
pub struct InMemoryIndex {
    dimension: usize,
    namespaces: RwLock<BTreeMap<String, HashMap<String, StoredVector>>>,
}

impl InMemoryIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            namespaces: RwLock::new(BTreeMap::new()),
        }
    }

    /// Total records across namespaces.
    pub fn len(&self) -> usize {
        self.namespaces
            .read()
            .map(|ns| ns.values().map(|v| v.len()).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> RagError {
    RagError::Config("in-memory index lock poisoned".to_string())
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn describe_stats(&self) -> Result<IndexStats> {
        let namespaces = self.namespaces.read().map_err(|_| poisoned())?;
        let counts: BTreeMap<String, u64> = namespaces
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.clone(), v.len() as u64))
            .collect();
        Ok(IndexStats {
            dimension: self.dimension,
            total_vector_count: counts.values().sum(),
            namespaces: counts,
        })
    }

    async fn query(&self, request: &QueryRequest) -> Result<Vec<QueryMatch>> {
        let namespaces = self.namespaces.read().map_err(|_| poisoned())?;
        let ns = request.namespace.clone().unwrap_or_default();
        let Some(vectors) = namespaces.get(&ns) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<QueryMatch> = vectors
            .iter()
            .filter(|(_, sv)| {
                request
                    .filter
                    .as_ref()
                    .map(|f| f.matches(&sv.metadata))
                    .unwrap_or(true)
            })
            .map(|(id, sv)| QueryMatch {
                id: id.clone(),
                score: cosine_similarity(&request.vector, &sv.values),
                metadata: if request.include_metadata {
                    sv.metadata.clone()
                } else {
                    serde_json::Value::Null
                },
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(request.top_k);
        Ok(matches)
    }

    async fn upsert(&self, records: &[VectorRecord], namespace: &str) -> Result<usize> {
        for r in records {
            if r.values.len() != self.dimension {
                return Err(RagError::Upstream {
                    service: SERVICE,
                    status: 400,
                    body: format!(
                        "vector {} has dimension {}, index expects {}",
                        r.id,
                        r.values.len(),
                        self.dimension
                    ),
                });
            }
        }
        let mut namespaces = self.namespaces.write().map_err(|_| poisoned())?;
        let ns = namespaces.entry(namespace.to_string()).or_default();
        for r in records {
            ns.insert(
                r.id.clone(),
                StoredVector {
                    values: r.values.clone(),
                    metadata: r.metadata.clone(),
                },
            );
        }
        Ok(records.len())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        let mut namespaces = self.namespaces.write().map_err(|_| poisoned())?;
        namespaces.remove(namespace);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, values: Vec<f32>, hash: &str, text: &str) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            values,
            metadata: serde_json::json!({ "source_hash": hash, "text": text }),
        }
    }

    #[tokio::test]
    async fn test_memory_query_ranks_by_similarity() {
        let index = InMemoryIndex::new(2);
        index
            .upsert(
                &[
                    record("a", vec![1.0, 0.0], "h1", "alpha"),
                    record("b", vec![0.0, 1.0], "h1", "beta"),
                ],
                "docs",
            )
            .await
            .unwrap();

        let req = QueryRequest::new(vec![0.9, 0.1], 1).namespace(Some("docs"));
        let matches = index.query(&req).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "a");
        assert_eq!(matches[0].text(), "alpha");
    }

    #[tokio::test]
    async fn test_memory_namespaces_are_isolated() {
        let index = InMemoryIndex::new(2);
        index
            .upsert(&[record("a", vec![1.0, 0.0], "h1", "alpha")], "one")
            .await
            .unwrap();

        let req = QueryRequest::new(vec![1.0, 0.0], 5).namespace(Some("two"));
        assert!(index.query(&req).await.unwrap().is_empty());

        let stats = index.describe_stats().await.unwrap();
        assert_eq!(stats.namespace_names(), vec!["one".to_string()]);
        assert_eq!(stats.total_vector_count, 1);
    }

    #[tokio::test]
    async fn test_memory_filter_on_source_hash() {
        let index = InMemoryIndex::new(2);
        index
            .upsert(&[record("a", vec![1.0, 0.0], "h1", "alpha")], "docs")
            .await
            .unwrap();

        let hit = QueryRequest::new(vec![0.0, 0.0], 1)
            .namespace(Some("docs"))
            .filter(MetadataFilter::eq("source_hash", "h1"))
            .without_metadata();
        assert_eq!(index.query(&hit).await.unwrap().len(), 1);

        let miss = QueryRequest::new(vec![0.0, 0.0], 1)
            .namespace(Some("docs"))
            .filter(MetadataFilter::eq("source_hash", "h2"));
        assert!(index.query(&miss).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_rejects_wrong_dimension() {
        let index = InMemoryIndex::new(3);
        let err = index
            .upsert(&[record("a", vec![1.0], "h", "t")], "docs")
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_memory_delete_namespace() {
        let index = InMemoryIndex::new(2);
        index
            .upsert(&[record("a", vec![1.0, 0.0], "h", "t")], "docs")
            .await
            .unwrap();
        index.delete_namespace("docs").await.unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_parse_stats() {
        let json = serde_json::json!({
            "dimension": 1024,
            "totalVectorCount": 7,
            "namespaces": {
                "Msme_Guide": { "vectorCount": 5 },
                "Artists": { "vectorCount": 2 }
            }
        });
        let stats = parse_stats(&json).unwrap();
        assert_eq!(stats.dimension, 1024);
        assert_eq!(stats.namespaces["Msme_Guide"], 5);
        assert_eq!(stats.namespace_names(), vec!["Artists", "Msme_Guide"]);
    }

    #[test]
    fn test_parse_matches_missing_is_empty() {
        assert!(parse_matches(&serde_json::json!({})).unwrap().is_empty());
    }

    #[test]
    fn test_filter_json_shape() {
        let f = MetadataFilter::eq("source_hash", "abc");
        assert_eq!(f.to_json(), serde_json::json!({ "source_hash": { "$eq": "abc" } }));
    }

    #[test]
    fn test_cosine_orthogonal_and_empty() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
