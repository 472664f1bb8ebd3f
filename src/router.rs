//! Namespace routing.
//!
//! Lists the namespaces present in the index and asks the chat model which
//! one fits the recent conversation. The model's answer is untrusted: it is
//! accepted only when it equals a known namespace after trimming. Every
//! failure degrades to `None`, meaning "search the default namespace".

use crate::config::RouterConfig;
use crate::index::VectorIndex;
use crate::llm::{ChatModel, ChatOptions};
use crate::models::ChatMessage;

pub struct NamespaceRouter<'a> {
    index: &'a dyn VectorIndex,
    model: &'a dyn ChatModel,
    temperature: f32,
}

impl<'a> NamespaceRouter<'a> {
    pub fn new(index: &'a dyn VectorIndex, model: &'a dyn ChatModel, config: &RouterConfig) -> Self {
        Self {
            index,
            model,
            temperature: config.temperature,
        }
    }

    /// Pick the namespace for `recent_text`, or `None` to search everywhere.
    pub async fn detect(&self, recent_text: &str) -> Option<String> {
        let namespaces = match self.index.describe_stats().await {
            Ok(stats) => stats.namespace_names(),
            Err(e) => {
                tracing::warn!("namespace detection failed listing namespaces: {}", e);
                return None;
            }
        };

        if namespaces.is_empty() {
            tracing::debug!("index has no namespaces; skipping routing");
            return None;
        }

        let prompt = routing_prompt(&namespaces, recent_text);
        let answer = match self
            .model
            .complete(
                &[ChatMessage::user(prompt)],
                ChatOptions::new(self.temperature),
            )
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("namespace detection failed ({}): {}", e.kind(), e);
                return None;
            }
        };

        let routed = validate_choice(&answer, &namespaces);
        match &routed {
            Some(ns) => tracing::info!("detected namespace: {}", ns),
            None => tracing::info!(
                "could not confidently detect namespace (model said {:?}); searching default",
                answer.trim()
            ),
        }
        routed
    }
}

/// Accept `answer` only if it names one of `known` exactly.
pub fn validate_choice(answer: &str, known: &[String]) -> Option<String> {
    let answer = answer.trim();
    known.iter().find(|ns| ns.as_str() == answer).cloned()
}

fn routing_prompt(namespaces: &[String], question: &str) -> String {
    format!(
        "You are Connie, the ConnecWrk AI assistant.\n\n\
         Available knowledge areas (namespaces):\n{:?}\n\n\
         Based on the user's question, decide which namespace is most relevant.\n\
         Return only the namespace name exactly as listed.\n\n\
         Question:\n\"{}\"",
        namespaces, question
    )
}
