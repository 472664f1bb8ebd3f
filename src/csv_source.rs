//! Conversation-dataset loader for `connie ingest csv`.
//!
//! Reads one text column from a CSV export and drops rows that are empty or
//! mention any excluded phrase (crisis-line boilerplate that should never be
//! echoed back by the companion).

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{RagError, Result};

/// Column holding the user's side of the conversation, when present.
pub const CONTEXT_COLUMN: &str = "Context";

/// One kept response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvResponse {
    pub text: String,
    /// The row has a non-empty [`CONTEXT_COLUMN`] value.
    pub has_context: bool,
}

impl CsvResponse {
    /// Labels stored with every chunk of this response.
    pub fn tags(&self) -> BTreeMap<String, serde_json::Value> {
        BTreeMap::from([
            ("tone".to_string(), "supportive".into()),
            ("intent".to_string(), "emotional_support".into()),
            ("has_context".to_string(), self.has_context.into()),
        ])
    }
}

/// Rows kept after filtering, plus counts for the ingest summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvResponses {
    pub responses: Vec<CsvResponse>,
    pub total_rows: usize,
    pub excluded_rows: usize,
}

/// Load the `column` of every row from `bytes`, keeping only safe responses.
pub fn load_responses(
    path: &Path,
    bytes: &[u8],
    column: &str,
    excluded_phrases: &[String],
) -> Result<CsvResponses> {
    let extract_err = |message: String| RagError::Extract {
        path: path.display().to_string(),
        message,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);
    let headers = reader
        .headers()
        .map_err(|e| extract_err(e.to_string()))?
        .clone();
    let position = headers
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| extract_err(format!("column '{}' not found", column)))?;
    let context_position = headers.iter().position(|h| h.trim() == CONTEXT_COLUMN);

    let lowered: Vec<String> = excluded_phrases.iter().map(|p| p.to_lowercase()).collect();
    let mut out = CsvResponses::default();

    for record in reader.records() {
        let record = record.map_err(|e| extract_err(e.to_string()))?;
        let value = record.get(position).unwrap_or("").trim();
        if value.is_empty() {
            // missing responses are dropped before counting
            continue;
        }
        out.total_rows += 1;
        if is_safe_response(value, &lowered) {
            let has_context = context_position
                .and_then(|i| record.get(i))
                .is_some_and(|c| !c.trim().is_empty());
            out.responses.push(CsvResponse {
                text: value.to_string(),
                has_context,
            });
        } else {
            out.excluded_rows += 1;
        }
    }

    tracing::info!(
        "csv {}: {} rows, {} excluded",
        path.display(),
        out.total_rows,
        out.excluded_rows
    );
    Ok(out)
}

/// `true` when `text` contains none of `lowered_phrases` (already
/// lowercase), ignoring case.
pub fn is_safe_response(text: &str, lowered_phrases: &[String]) -> bool {
    let lower = text.to_lowercase();
    !lowered_phrases.iter().any(|p| lower.contains(p.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrases() -> Vec<String> {
        vec!["hotline".to_string(), "call 911".to_string()]
    }

    #[test]
    fn test_filters_unsafe_and_empty_rows() {
        let data = "Context,Response\n\
                    ,It sounds like a heavy week.\n\
                    b,Please Call 911 right away.\n\
                    c,\n\
                    d,\"Reach out to a hotline, or a friend.\"\n\
                    e,Taking a short walk can help.\n";
        let rows = load_responses(Path::new("c.csv"), data.as_bytes(), "Response", &phrases())
            .unwrap();
        let texts: Vec<&str> = rows.responses.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["It sounds like a heavy week.", "Taking a short walk can help."]
        );
        assert!(!rows.responses[0].has_context);
        assert!(rows.responses[1].has_context);
        assert_eq!(rows.total_rows, 4);
        assert_eq!(rows.excluded_rows, 2);
    }

    #[test]
    fn test_missing_column_is_error() {
        let err = load_responses(Path::new("c.csv"), b"A,B\n1,2\n", "Response", &[]).unwrap_err();
        assert!(err.to_string().contains("column 'Response' not found"));
    }

    #[test]
    fn test_tags_label_every_response() {
        let rows = load_responses(
            Path::new("c.csv"),
            b"Response\nOne breath at a time.\n",
            "Response",
            &[],
        )
        .unwrap();
        let tags = rows.responses[0].tags();
        assert_eq!(tags["tone"], "supportive");
        assert_eq!(tags["intent"], "emotional_support");
        // no Context column at all
        assert_eq!(tags["has_context"], false);
    }

    #[test]
    fn test_safe_check_ignores_case() {
        assert!(!is_safe_response("SUICIDE HOTLINE numbers", &phrases()));
        assert!(is_safe_response("You are doing fine.", &phrases()));
    }
}
