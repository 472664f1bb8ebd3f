//! Provider wiring: builds the embedder, index, chat models and URL
//! verifier described by a [`Config`].
//!
//! The chat pipelines and ingestion only see the trait objects held here, so
//! tests substitute in-memory fakes by constructing [`Services`] directly.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::embedding::{Embedder, OpenAiEmbedder};
use crate::error::{RagError, Result};
use crate::guardrail::{HttpUrlVerifier, UrlVerifier};
use crate::index::{create_index, VectorIndex};
use crate::llm::{create_chat_model, ChatModel};

#[derive(Clone)]
pub struct Services {
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    /// Model behind the support assistant and the namespace router.
    pub chat: Arc<dyn ChatModel>,
    /// Model behind the companion; the same as `chat` unless
    /// `[companion.chat]` is configured.
    pub companion_chat: Arc<dyn ChatModel>,
    pub verifier: Arc<dyn UrlVerifier>,
}

impl Services {
    /// Construct every provider. Missing API keys surface here as
    /// [`RagError::Config`].
    pub fn from_config(config: &Config) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(&config.embedding)?);
        let index: Arc<dyn VectorIndex> = Arc::from(create_index(&config.index)?);
        let chat: Arc<dyn ChatModel> = Arc::from(create_chat_model(&config.chat)?);
        let companion_chat: Arc<dyn ChatModel> = match &config.companion.chat {
            Some(chat_config) => Arc::from(create_chat_model(chat_config)?),
            None => chat.clone(),
        };
        let verifier = HttpUrlVerifier::new(Duration::from_millis(config.guardrail.url_timeout_ms))
            .map_err(|e| RagError::Config(e.to_string()))?;

        tracing::info!(
            "providers ready: embedding={} chat={} companion={} index={}",
            embedder.model_name(),
            chat.model_name(),
            companion_chat.model_name(),
            config.index.provider
        );

        Ok(Self {
            embedder,
            index,
            chat,
            companion_chat,
            verifier: Arc::new(verifier),
        })
    }

    /// Only what ingestion and index maintenance need: no chat model or URL
    /// verifier, so no chat credentials are required.
    pub fn index_only(config: &Config) -> Result<(Arc<dyn Embedder>, Arc<dyn VectorIndex>)> {
        let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(&config.embedding)?);
        let index: Arc<dyn VectorIndex> = Arc::from(create_index(&config.index)?);
        Ok((embedder, index))
    }
}
