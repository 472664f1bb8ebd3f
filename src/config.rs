use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable holding the vector index API key.
pub const PINECONE_API_KEY_ENV: &str = "PINECONE_API_KEY";
/// Environment variable overriding `[index].host`.
pub const PINECONE_INDEX_HOST_ENV: &str = "PINECONE_INDEX_HOST";
/// Environment variable holding the embedding/chat API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub support: SupportConfig,
    #[serde(default)]
    pub companion: CompanionConfig,
    #[serde(default)]
    pub guardrail: GuardrailConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub csv: CsvConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:8080".to_string(),
        "http://127.0.0.1:8080".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// `pinecone` or `memory`.
    #[serde(default = "default_index_provider")]
    pub provider: String,
    /// Data-plane host of the index, e.g. `https://docs-abc123.svc.us-east-1.pinecone.io`.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: default_index_provider(),
            host: None,
            dimension: default_dimension(),
            upsert_batch_size: default_upsert_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_index_provider() -> String {
    "pinecone".to_string()
}
fn default_dimension() -> usize {
    1024
}
fn default_upsert_batch_size() -> usize {
    100
}
fn default_timeout_secs() -> u64 {
    30
}

impl IndexConfig {
    /// Resolve the index host, letting the environment win over the file.
    pub fn resolved_host(&self) -> Option<String> {
        std::env::var(PINECONE_INDEX_HOST_ENV)
            .ok()
            .filter(|h| !h.trim().is_empty())
            .or_else(|| self.host.clone())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_embedding_model(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_embedding_model() -> String {
    "intfloat/multilingual-e5-large".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// `openai` or `ollama`.
    #[serde(default = "default_chat_provider")]
    pub provider: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: default_chat_provider(),
            base_url: default_openai_base_url(),
            model: default_chat_model(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_chat_provider() -> String {
    "openai".to_string()
}
fn default_chat_model() -> String {
    "gpt-4.1-nano-2025-04-14".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RouterConfig {
    #[serde(default = "default_router_temperature")]
    pub temperature: f32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            temperature: default_router_temperature(),
        }
    }
}

fn default_router_temperature() -> f32 {
    0.2
}

#[derive(Debug, Deserialize, Clone)]
pub struct SupportConfig {
    /// Messages rendered into the prompt's chat history.
    #[serde(default = "default_history_messages")]
    pub history_messages: usize,
    /// Messages fed to the namespace router.
    #[serde(default = "default_router_messages")]
    pub router_messages: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_support_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_support_temperature")]
    pub temperature: f32,
}

impl Default for SupportConfig {
    fn default() -> Self {
        Self {
            history_messages: default_history_messages(),
            router_messages: default_router_messages(),
            top_k: default_top_k(),
            max_context_chars: default_max_context_chars(),
            max_tokens: default_support_max_tokens(),
            temperature: default_support_temperature(),
        }
    }
}

fn default_history_messages() -> usize {
    6
}
fn default_router_messages() -> usize {
    3
}
fn default_top_k() -> usize {
    3
}
fn default_max_context_chars() -> usize {
    2500
}
fn default_support_max_tokens() -> u32 {
    250
}
fn default_support_temperature() -> f32 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompanionConfig {
    /// Pull background context from the index before answering.
    #[serde(default)]
    pub retrieval: bool,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Conversation turns (user + assistant pairs) kept in the prompt.
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_companion_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_companion_temperature")]
    pub temperature: f32,
    /// Separate chat backend for the companion, e.g. a local Ollama model.
    /// Falls back to `[chat]` when absent.
    #[serde(default)]
    pub chat: Option<ChatConfig>,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            retrieval: false,
            namespace: None,
            context_turns: default_context_turns(),
            top_k: default_top_k(),
            max_tokens: default_companion_max_tokens(),
            temperature: default_companion_temperature(),
            chat: None,
        }
    }
}

fn default_context_turns() -> usize {
    4
}
fn default_companion_max_tokens() -> u32 {
    90
}
fn default_companion_temperature() -> f32 {
    0.45
}

#[derive(Debug, Deserialize, Clone)]
pub struct GuardrailConfig {
    /// Per-URL reachability timeout.
    #[serde(default = "default_url_timeout_ms")]
    pub url_timeout_ms: u64,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            url_timeout_ms: default_url_timeout_ms(),
        }
    }
}

fn default_url_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_docs_dir")]
    pub docs_dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    #[serde(default = "default_namespace_map_path")]
    pub namespace_map_path: PathBuf,
    #[serde(default = "default_chunk_words")]
    pub chunk_words: usize,
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            docs_dir: default_docs_dir(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            log_path: default_log_path(),
            namespace_map_path: default_namespace_map_path(),
            chunk_words: default_chunk_words(),
            overlap_words: default_overlap_words(),
        }
    }
}

fn default_docs_dir() -> PathBuf {
    PathBuf::from("data/docs")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string()]
}
fn default_log_path() -> PathBuf {
    PathBuf::from("data/ingest_log.json")
}
fn default_namespace_map_path() -> PathBuf {
    PathBuf::from("data/namespace_map.json")
}
fn default_chunk_words() -> usize {
    800
}
fn default_overlap_words() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct CsvConfig {
    #[serde(default = "default_csv_column")]
    pub column: String,
    #[serde(default = "default_csv_namespace")]
    pub namespace: String,
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
    #[serde(default = "default_excluded_phrases")]
    pub excluded_phrases: Vec<String>,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            column: default_csv_column(),
            namespace: default_csv_namespace(),
            chunk_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
            excluded_phrases: default_excluded_phrases(),
        }
    }
}

fn default_csv_column() -> String {
    "Response".to_string()
}
fn default_csv_namespace() -> String {
    "conversations".to_string()
}
fn default_chunk_chars() -> usize {
    600
}
fn default_overlap_chars() -> usize {
    80
}
fn default_excluded_phrases() -> Vec<String> {
    [
        "call 911",
        "emergency services",
        "suicide hotline",
        "hotline",
        "kill yourself",
        "end your life",
        "immediate danger",
        "hospitalized immediately",
        "contact authorities",
        "you must seek immediate",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: BTreeMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            index: IndexConfig::default(),
            embedding: EmbeddingConfig::default(),
            chat: ChatConfig::default(),
            router: RouterConfig::default(),
            support: SupportConfig::default(),
            companion: CompanionConfig::default(),
            guardrail: GuardrailConfig::default(),
            ingest: IngestConfig::default(),
            csv: CsvConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Load and validate a config file. A missing file yields the defaults so
/// that an environment-only setup still works.
pub fn load_config(path: &Path) -> Result<Config> {
    let config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        Config::default()
    };

    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

fn validate(config: &Config) -> Result<()> {
    if config.ingest.chunk_words == 0 {
        anyhow::bail!("ingest.chunk_words must be > 0");
    }
    if config.ingest.overlap_words >= config.ingest.chunk_words {
        anyhow::bail!("ingest.overlap_words must be smaller than ingest.chunk_words");
    }
    if config.csv.chunk_chars == 0 || config.csv.overlap_chars >= config.csv.chunk_chars {
        anyhow::bail!("csv.overlap_chars must be smaller than csv.chunk_chars (> 0)");
    }
    if config.index.dimension == 0 {
        anyhow::bail!("index.dimension must be > 0");
    }
    if config.index.upsert_batch_size == 0 || config.embedding.batch_size == 0 {
        anyhow::bail!("batch sizes must be > 0");
    }
    if config.support.top_k == 0 {
        anyhow::bail!("support.top_k must be >= 1");
    }
    if config.companion.top_k == 0 {
        anyhow::bail!("companion.top_k must be >= 1");
    }

    match config.index.provider.as_str() {
        "pinecone" | "memory" => {}
        other => anyhow::bail!(
            "Unknown index provider: '{}'. Must be pinecone or memory.",
            other
        ),
    }

    let chat_configs = std::iter::once(&config.chat).chain(config.companion.chat.as_ref());
    for chat in chat_configs {
        match chat.provider.as_str() {
            "openai" | "ollama" => {}
            other => anyhow::bail!(
                "Unknown chat provider: '{}'. Must be openai or ollama.",
                other
            ),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.support.top_k, 3);
        assert_eq!(config.support.max_context_chars, 2500);
        assert_eq!(config.guardrail.url_timeout_ms, 2000);
        assert_eq!(config.ingest.chunk_words, 800);
        assert_eq!(config.ingest.overlap_words, 100);
        assert_eq!(config.index.dimension, 1024);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_partial_sections_override() {
        let config = parse_config(
            r#"
[server]
bind = "0.0.0.0:9000"

[index]
provider = "memory"
dimension = 8

[chat]
provider = "ollama"
base_url = "http://localhost:11434"
model = "mistral"
"#,
        )
        .unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.server.cors_origins.len(), 2);
        assert_eq!(config.index.provider, "memory");
        assert_eq!(config.chat.model, "mistral");
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let config = parse_config("[index]\nprovider = \"qdrant\"\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_window() {
        let config = parse_config("[ingest]\nchunk_words = 10\noverlap_words = 10\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_companion_chat_override() {
        let config = parse_config(
            "[companion]\nretrieval = true\n\n[companion.chat]\nprovider = \"ollama\"\nbase_url = \"http://localhost:11434\"\nmodel = \"llama3.1\"\n",
        )
        .unwrap();
        let chat = config.companion.chat.as_ref().unwrap();
        assert_eq!(chat.provider, "ollama");
        assert_eq!(chat.max_retries, 2);
        assert!(config.companion.retrieval);
        assert!(validate(&config).is_ok());

        let bad = parse_config("[companion.chat]\nprovider = \"bard\"\n").unwrap();
        assert!(validate(&bad).is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = load_config(Path::new("/nonexistent/connie.toml")).unwrap();
        assert_eq!(config.chat.provider, "openai");
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let config = parse_config(include_str!("../config/connie.example.toml")).unwrap();
        assert!(validate(&config).is_ok());
        let defaults = Config::default();
        assert_eq!(config.server.bind, defaults.server.bind);
        assert_eq!(config.index.dimension, defaults.index.dimension);
        assert_eq!(config.support.max_tokens, defaults.support.max_tokens);
        assert_eq!(config.csv.excluded_phrases, defaults.csv.excluded_phrases);
        assert!(config.companion.chat.is_none());
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let config = parse_config("[support]\ntop_k = 0\n").unwrap();
        assert!(validate(&config).is_err());

        let config = parse_config("[companion]\ntop_k = 0\n").unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("companion.top_k"));
    }
}
