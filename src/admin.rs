//! Index maintenance commands: `namespaces`, `inspect`, `delete-namespace`.
//!
//! Output goes to stdout in the same plain block style as the ingest summary.

use anyhow::{Context, Result};
use std::io::BufRead;

use crate::index::{QueryRequest, VectorIndex};

/// Characters of chunk text shown per match by `inspect`.
pub const PREVIEW_CHARS: usize = 500;

/// Print index dimension, total vectors and per-namespace counts.
pub async fn run_namespaces(index: &dyn VectorIndex) -> Result<()> {
    let stats = index
        .describe_stats()
        .await
        .context("failed to read index stats")?;

    println!("Index stats");
    println!("===========");
    println!();
    println!("  Dimension:   {}", stats.dimension);
    println!("  Vectors:     {}", stats.total_vector_count);
    println!("  Namespaces:  {}", stats.namespaces.len());
    if !stats.namespaces.is_empty() {
        println!();
        let width = stats.namespaces.keys().map(|k| k.len()).max().unwrap_or(0);
        for (name, count) in &stats.namespaces {
            let label = if name.is_empty() { "(default)" } else { name };
            println!("  {:<width$}  {:>8}", label, count, width = width.max(9));
        }
    }
    println!();
    println!("ok");
    Ok(())
}

/// Preview up to `limit` chunks of a namespace by querying with a zero
/// vector of the index dimension.
pub async fn run_inspect(
    index: &dyn VectorIndex,
    dimension: usize,
    namespace: &str,
    limit: usize,
) -> Result<()> {
    let request = QueryRequest::new(vec![0.0; dimension], limit).namespace(Some(namespace));
    let matches = index
        .query(&request)
        .await
        .with_context(|| format!("failed to query namespace '{}'", namespace))?;

    println!("inspect {} (limit {})", namespace, limit);
    if matches.is_empty() {
        println!("  no chunks found in namespace '{}'", namespace);
        return Ok(());
    }

    for (i, m) in matches.iter().enumerate() {
        println!();
        println!("--- chunk {}/{} ({}) ---", i + 1, matches.len(), m.id);
        println!("{}", preview(m.text(), PREVIEW_CHARS));
        println!("metadata: {}", metadata_without_text(&m.metadata));
    }
    Ok(())
}

/// Delete every vector in `namespace`. Without `yes`, asks on stdin first.
pub async fn run_delete_namespace(index: &dyn VectorIndex, namespace: &str, yes: bool) -> Result<()> {
    if !yes {
        print!(
            "Delete ALL vectors in namespace '{}'? This cannot be undone. (y/n): ",
            namespace
        );
        std::io::Write::flush(&mut std::io::stdout())?;
        let stdin = std::io::stdin();
        if !confirm(&mut stdin.lock())? {
            println!("cancelled");
            return Ok(());
        }
    }

    index
        .delete_namespace(namespace)
        .await
        .with_context(|| format!("failed to delete namespace '{}'", namespace))?;
    tracing::info!("deleted namespace '{}'", namespace);
    println!("deleted namespace '{}'", namespace);
    println!("ok");
    Ok(())
}

/// Read one line; `y` or `yes` (any case) confirms.
pub fn confirm(reader: &mut impl BufRead) -> Result<bool> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let answer = line.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

/// First `max_chars` characters, with `...` when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn metadata_without_text(metadata: &serde_json::Value) -> serde_json::Value {
    let mut metadata = metadata.clone();
    if let Some(obj) = metadata.as_object_mut() {
        obj.remove("text");
    }
    metadata
}
