//! Chat-completion clients.
//!
//! [`ChatModel`] is implemented by:
//! - [`OpenAiChat`]: `POST {base_url}/chat/completions` (OpenAI-compatible).
//! - [`OllamaChat`]: `POST {base_url}/api/chat` with `stream: false`.
//!
//! Both share the embedding client's retry rule: 429/5xx/network errors are
//! retried with exponential backoff up to `max_retries`.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::{ChatConfig, OPENAI_API_KEY_ENV};
use crate::error::{json_or_error, RagError, Result};
use crate::models::ChatMessage;

const SERVICE: &str = "chat";

/// Sampling parameters for one completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl ChatOptions {
    pub fn new(temperature: f32) -> Self {
        Self {
            temperature,
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Return the assistant message content for `messages`.
    async fn complete(&self, messages: &[ChatMessage], options: ChatOptions) -> Result<String>;
}

/// Build the configured chat model.
pub fn create_chat_model(config: &ChatConfig) -> Result<Box<dyn ChatModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiChat::new(config)?)),
        "ollama" => Ok(Box::new(OllamaChat::new(config)?)),
        other => Err(RagError::Config(format!("unknown chat provider: {}", other))),
    }
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RagError::Config(e.to_string()))
}

async fn with_retries<F, Fut>(max_retries: u32, mut call: F) -> Result<String>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<String>>,
{
    let mut attempt = 0u32;
    loop {
        match call().await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let delay = Duration::from_secs(1 << attempt.min(5));
                tracing::warn!(
                    "chat attempt {} failed ({}), retrying in {:?}",
                    attempt + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// ============ OpenAI-compatible ============

pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_retries: u32,
}

impl OpenAiChat {
    /// Build from config. Fails when `OPENAI_API_KEY` is not set.
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let api_key = std::env::var(OPENAI_API_KEY_ENV).map_err(|_| {
            RagError::Config(format!("{} environment variable not set", OPENAI_API_KEY_ENV))
        })?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &ChatConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn request_once(&self, messages: &[ChatMessage], options: ChatOptions) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": options.temperature,
        });
        if let Some(max) = options.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::from_reqwest(SERVICE, e))?;

        let json = json_or_error(SERVICE, response).await?;
        parse_openai_completion(&json)
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage], options: ChatOptions) -> Result<String> {
        with_retries(self.max_retries, move || self.request_once(messages, options)).await
    }
}

/// `choices[0].message.content`, trimmed.
pub fn parse_openai_completion(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| RagError::parse(SERVICE, "missing choices[0].message.content"))
}

// ============ Ollama ============

pub struct OllamaChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_retries: u32,
}

impl OllamaChat {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn request_once(&self, messages: &[ChatMessage], options: ChatOptions) -> Result<String> {
        let mut opts = serde_json::json!({ "temperature": options.temperature });
        if let Some(max) = options.max_tokens {
            opts["num_predict"] = serde_json::json!(max);
        }
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": opts,
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::from_reqwest(SERVICE, e))?;

        let json = json_or_error(SERVICE, response).await?;
        parse_ollama_completion(&json)
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage], options: ChatOptions) -> Result<String> {
        with_retries(self.max_retries, move || self.request_once(messages, options)).await
    }
}

/// `message.content`, untrimmed (the companion cleanup handles whitespace).
pub fn parse_ollama_completion(json: &serde_json::Value) -> Result<String> {
    json.pointer("/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.to_string())
        .ok_or_else(|| RagError::parse(SERVICE, "missing message.content"))
}
