//! Deduplicating ingestion into the vector index.
//!
//! Coordinates the flow: discover files → content hash → skip checks →
//! extract → chunk → embed → upsert. Two persisted JSON maps make re-runs
//! cheap:
//!
//! - [`IngestLog`]: file path → content hash seen at the last successful run.
//! - [`NamespaceMap`]: content hash → namespace, so identical content always
//!   lands in the same namespace.
//!
//! A file is skipped when its hash matches the log, or when the index already
//! holds a vector tagged with that `source_hash` in the target namespace.
//! Failures abort the current file only; chunks already upserted for it stay.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::chunk::{chunk_words, make_chunk, sha256_hex, split_recursive, DEFAULT_SEPARATORS};
use crate::config::Config;
use crate::csv_source;
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::extract::extract_text;
use crate::index::{MetadataFilter, QueryRequest, VectorIndex};
use crate::models::{Chunk, VectorRecord};

/// Run-level switches from the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// Ignore the ingest log.
    pub full: bool,
    /// Skip the index existence check as well.
    pub force: bool,
    /// Count what would be uploaded without touching the index or the JSON maps.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub discovered: usize,
    pub indexed: usize,
    pub unchanged: usize,
    pub already_present: usize,
    pub failed: usize,
    pub chunks_upserted: usize,
    pub failed_files: Vec<String>,
}

impl IngestReport {
    /// Print the summary block on stdout, ending with `ok`.
    pub fn print(&self, label: &str, dry_run: bool) {
        if dry_run {
            println!("ingest {} (dry-run)", label);
        } else {
            println!("ingest {}", label);
        }
        println!("  files found: {}", self.discovered);
        println!("  indexed: {}", self.indexed);
        println!("  unchanged: {}", self.unchanged);
        println!("  already in index: {}", self.already_present);
        if dry_run {
            println!("  chunks to upsert: {}", self.chunks_upserted);
        } else {
            println!("  chunks upserted: {}", self.chunks_upserted);
        }
        if self.failed > 0 {
            println!("  failed: {}", self.failed);
            for path in &self.failed_files {
                println!("    {}", path);
            }
        }
        println!("ok");
    }
}

// ============ Persisted maps ============

fn load_json_map(path: &Path) -> Result<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(&content)
        .map_err(|e| RagError::parse("ingest", format!("{}: {}", path.display(), e)))
}

fn save_json_map(path: &Path, entries: &BTreeMap<String, String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(entries)
        .map_err(|e| RagError::parse("ingest", e.to_string()))?;
    std::fs::write(path, json)?;
    Ok(())
}

/// File path → content hash of the last successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestLog {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl IngestLog {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            entries: load_json_map(path)?,
        })
    }

    pub fn is_unchanged(&self, file: &str, hash: &str) -> bool {
        self.entries.get(file).map(String::as_str) == Some(hash)
    }

    pub fn record(&mut self, file: &str, hash: &str) {
        self.entries.insert(file.to_string(), hash.to_string());
    }

    pub fn save(&self) -> Result<()> {
        save_json_map(&self.path, &self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Content hash → namespace.
#[derive(Debug, Clone)]
pub struct NamespaceMap {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl NamespaceMap {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            entries: load_json_map(path)?,
        })
    }

    pub fn get(&self, hash: &str) -> Option<&str> {
        self.entries.get(hash).map(String::as_str)
    }

    /// The namespace for `hash`, assigning `sanitize_namespace(stem)` on
    /// first sight. The flag is `true` when a new entry was created.
    pub fn resolve(&mut self, hash: &str, stem: &str) -> (String, bool) {
        if let Some(existing) = self.entries.get(hash) {
            return (existing.clone(), false);
        }
        let namespace = sanitize_namespace(stem);
        self.entries.insert(hash.to_string(), namespace.clone());
        (namespace, true)
    }

    pub fn save(&self) -> Result<()> {
        save_json_map(&self.path, &self.entries)
    }
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_namespace(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ============ Discovery ============

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| RagError::Config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RagError::Config(format!("invalid glob set: {}", e)))
}

/// Files under `root` matching the include globs and none of the exclude
/// globs, matched against the path relative to `root`. Sorted.
pub fn discover_files(root: &Path, include: &[String], exclude: &[String]) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(RagError::Config(format!(
            "documents directory does not exist: {}",
            root.display()
        )));
    }

    let include_set = build_globset(include)?;
    let exclude_set = build_globset(exclude)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| RagError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy();

        if exclude_set.is_match(rel_str.as_ref()) || !include_set.is_match(rel_str.as_ref()) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

// ============ Pipeline ============

enum FileOutcome {
    Indexed(usize),
    Unchanged,
    AlreadyPresent,
}

pub struct Ingestor<'a> {
    embedder: &'a dyn Embedder,
    index: &'a dyn VectorIndex,
    config: &'a Config,
}

impl<'a> Ingestor<'a> {
    pub fn new(embedder: &'a dyn Embedder, index: &'a dyn VectorIndex, config: &'a Config) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    /// Ingest every matching document under `ingest.docs_dir`, one namespace
    /// per distinct file content.
    pub async fn ingest_documents(&self, options: IngestOptions) -> Result<IngestReport> {
        let ingest = &self.config.ingest;
        let files = discover_files(&ingest.docs_dir, &ingest.include_globs, &ingest.exclude_globs)?;
        let mut log = IngestLog::load(&ingest.log_path)?;
        let mut namespaces = NamespaceMap::load(&ingest.namespace_map_path)?;

        let mut report = IngestReport {
            discovered: files.len(),
            ..Default::default()
        };

        for path in &files {
            let result = self
                .ingest_document(path, &mut log, &mut namespaces, options)
                .await;
            tally(&mut report, path, result);
        }

        Ok(report)
    }

    async fn ingest_document(
        &self,
        path: &Path,
        log: &mut IngestLog,
        namespaces: &mut NamespaceMap,
        options: IngestOptions,
    ) -> Result<FileOutcome> {
        let bytes = std::fs::read(path)?;
        let hash = sha256_hex(&bytes);
        let key = path.display().to_string();
        let source = file_name(path);

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| source.clone());
        let (namespace, assigned) = namespaces.resolve(&hash, &stem);
        if assigned && !options.dry_run {
            namespaces.save()?;
        }

        if let Some(outcome) = self.skip_check(&key, &hash, &namespace, log, options).await? {
            return Ok(outcome);
        }

        tracing::info!("indexing {} -> namespace '{}'", source, namespace);
        let text = extract_text(path, &bytes)?;
        let chunks = chunk_words(
            &source,
            &hash,
            &text,
            self.config.ingest.chunk_words,
            self.config.ingest.overlap_words,
        );
        self.finish(&key, &hash, &namespace, &chunks, log, options)
            .await
    }

    /// Ingest a conversation CSV into `csv.namespace`.
    pub async fn ingest_csv(&self, path: &Path, options: IngestOptions) -> Result<IngestReport> {
        let mut log = IngestLog::load(&self.config.ingest.log_path)?;
        let mut report = IngestReport {
            discovered: 1,
            ..Default::default()
        };
        let result = self.ingest_csv_file(path, &mut log, options).await;
        tally(&mut report, path, result);
        Ok(report)
    }

    async fn ingest_csv_file(
        &self,
        path: &Path,
        log: &mut IngestLog,
        options: IngestOptions,
    ) -> Result<FileOutcome> {
        let csv = &self.config.csv;
        let bytes = std::fs::read(path)?;
        let hash = sha256_hex(&bytes);
        let key = path.display().to_string();

        if let Some(outcome) = self
            .skip_check(&key, &hash, &csv.namespace, log, options)
            .await?
        {
            return Ok(outcome);
        }

        let rows = csv_source::load_responses(path, &bytes, &csv.column, &csv.excluded_phrases)?;
        let source = file_name(path);
        let mut chunks: Vec<Chunk> = Vec::new();
        for response in &rows.responses {
            let tags = response.tags();
            for piece in split_recursive(&response.text, csv.chunk_chars, csv.overlap_chars, DEFAULT_SEPARATORS) {
                let mut chunk = make_chunk(&source, &hash, chunks.len(), &piece);
                chunk.metadata.tags = tags.clone();
                chunks.push(chunk);
            }
        }
        tracing::info!(
            "csv {}: {} responses -> {} chunks",
            key,
            rows.responses.len(),
            chunks.len()
        );

        self.finish(&key, &hash, &csv.namespace, &chunks, log, options)
            .await
    }

    /// Log and existence checks shared by both sources.
    async fn skip_check(
        &self,
        key: &str,
        hash: &str,
        namespace: &str,
        log: &mut IngestLog,
        options: IngestOptions,
    ) -> Result<Option<FileOutcome>> {
        if !options.full && log.is_unchanged(key, hash) {
            tracing::info!("skipping (no change): {}", key);
            return Ok(Some(FileOutcome::Unchanged));
        }

        if !options.force && self.document_exists(namespace, hash).await {
            tracing::info!("already in index: {} (namespace '{}')", key, namespace);
            log.record(key, hash);
            if !options.dry_run {
                log.save()?;
            }
            return Ok(Some(FileOutcome::AlreadyPresent));
        }

        Ok(None)
    }

    async fn finish(
        &self,
        key: &str,
        hash: &str,
        namespace: &str,
        chunks: &[Chunk],
        log: &mut IngestLog,
        options: IngestOptions,
    ) -> Result<FileOutcome> {
        if options.dry_run {
            return Ok(FileOutcome::Indexed(chunks.len()));
        }

        let upserted = self.upload(chunks, namespace).await?;
        log.record(key, hash);
        log.save()?;
        tracing::info!("uploaded {} chunks -> namespace '{}'", upserted, namespace);
        Ok(FileOutcome::Indexed(upserted))
    }

    /// Look for any vector tagged with `hash`. Errors count as "absent".
    pub async fn document_exists(&self, namespace: &str, hash: &str) -> bool {
        let request = QueryRequest::new(vec![0.0; self.config.index.dimension], 1)
            .namespace(Some(namespace))
            .filter(MetadataFilter::eq("source_hash", hash))
            .without_metadata();
        match self.index.query(&request).await {
            Ok(matches) => !matches.is_empty(),
            Err(e) => {
                tracing::warn!("existence check failed for {}: {}", namespace, e);
                false
            }
        }
    }

    /// Embed and upsert `chunks` in configured batch sizes.
    async fn upload(&self, chunks: &[Chunk], namespace: &str) -> Result<usize> {
        let mut records = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.config.embedding.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(RagError::parse(
                    "embeddings",
                    format!("expected {} vectors, got {}", batch.len(), vectors.len()),
                ));
            }
            records.extend(batch.iter().zip(vectors).map(|(chunk, values)| VectorRecord {
                id: chunk.id.clone(),
                values,
                metadata: chunk.to_record_metadata(),
            }));
        }

        let mut upserted = 0;
        for batch in records.chunks(self.config.index.upsert_batch_size) {
            upserted += self.index.upsert(batch, namespace).await?;
        }
        Ok(upserted)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn tally(report: &mut IngestReport, path: &Path, result: Result<FileOutcome>) {
    match result {
        Ok(FileOutcome::Indexed(n)) => {
            report.indexed += 1;
            report.chunks_upserted += n;
        }
        Ok(FileOutcome::Unchanged) => report.unchanged += 1,
        Ok(FileOutcome::AlreadyPresent) => report.already_present += 1,
        Err(e) => {
            tracing::error!("failed to ingest {} ({}): {}", path.display(), e.kind(), e);
            report.failed += 1;
            report.failed_files.push(path.display().to_string());
        }
    }
}
