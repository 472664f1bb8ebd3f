//! Context retrieval: embed the query, fetch nearest chunks, join their text.

use crate::embedding::Embedder;
use crate::error::Result;
use crate::index::{QueryRequest, VectorIndex};

/// Separator between retrieved chunk texts.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

pub struct Retriever<'a> {
    embedder: &'a dyn Embedder,
    index: &'a dyn VectorIndex,
}

impl<'a> Retriever<'a> {
    pub fn new(embedder: &'a dyn Embedder, index: &'a dyn VectorIndex) -> Self {
        Self { embedder, index }
    }

    /// Top-`top_k` chunk texts for `query`, blank-line separated. No matches
    /// gives an empty string.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        namespace: Option<&str>,
    ) -> Result<String> {
        let vector = self.embedder.embed_one(query).await?;
        let request = QueryRequest::new(vector, top_k).namespace(namespace);
        let matches = self.index.query(&request).await?;

        tracing::debug!(
            "retrieved {} matches from namespace {:?}",
            matches.len(),
            namespace
        );

        Ok(matches
            .iter()
            .map(|m| m.text())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR))
    }
}

/// Trim `text` to at most `max_chars` characters without cutting a sentence
/// in half: after the hard cut, back up to the last `.` or newline when one
/// exists past the first character.
pub fn smart_truncate(text: &str, max_chars: usize) -> String {
    if text.is_empty() {
        return String::new();
    }
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let mut truncated = &text[..cut];

    let boundary = match (truncated.rfind('.'), truncated.rfind('\n')) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
    if let Some(pos) = boundary.filter(|&p| p > 0) {
        truncated = &truncated[..=pos];
    }
    truncated.trim().to_string()
}
