//! Core data types shared by ingestion, retrieval and chat.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ErrorKind;

/// Identifying metadata attached to every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// File name (or dataset label) the chunk came from.
    pub source: String,
    pub chunk_index: usize,
    /// Content hash of the whole source file.
    #[serde(default)]
    pub source_hash: String,
    /// Source-specific labels stored next to the fixed fields.
    #[serde(default)]
    pub tags: BTreeMap<String, serde_json::Value>,
}

/// A bounded span of extracted text; the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// `"{source}_{hash prefix}"`, derived from the chunk text.
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Metadata stored next to the vector. Carries the text so retrieval
    /// does not need a second lookup.
    pub fn to_record_metadata(&self) -> serde_json::Value {
        let mut meta = serde_json::json!({
            "source": self.metadata.source,
            "source_file": self.metadata.source,
            "chunk_index": self.metadata.chunk_index,
            "source_hash": self.metadata.source_hash,
            "text": self.text,
        });
        if let Some(map) = meta.as_object_mut() {
            for (key, value) in &self.metadata.tags {
                map.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        meta
    }
}

/// A vector ready for upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// One nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl QueryMatch {
    /// The stored chunk text, or `""` when the match carries none.
    pub fn text(&self) -> &str {
        self.metadata
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
    }
}

/// Index-wide statistics; the namespace list drives routing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub dimension: usize,
    pub total_vector_count: u64,
    pub namespaces: BTreeMap<String, u64>,
}

impl IndexStats {
    pub fn namespace_names(&self) -> Vec<String> {
        self.namespaces.keys().cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// `"User"`, `"Assistant"`, the form used in rendered transcripts.
    pub fn label(&self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Reply returned to a chat caller. When generation failed, `reply` holds
/// the canned fallback and `error` names what went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatOutcome {
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl ChatOutcome {
    pub fn ok(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            error: None,
        }
    }

    pub fn fallback(reply: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            reply: reply.into(),
            error: Some(kind),
        }
    }
}
