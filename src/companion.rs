//! Veda, the conversational companion behind `POST /chat`.
//!
//! A short rolling window of the conversation plus a fixed persona prompt.
//! Retrieval is optional: when enabled, retrieved text is passed as a second
//! system message the model may draw on but must not quote.

use std::sync::Arc;

use crate::config::CompanionConfig;
use crate::embedding::Embedder;
use crate::format::clean_reply;
use crate::index::VectorIndex;
use crate::llm::{ChatModel, ChatOptions};
use crate::models::{ChatMessage, ChatOutcome};
use crate::retriever::Retriever;
use crate::services::Services;
use crate::session::{SessionStore, DEFAULT_SESSION};

pub const FALLBACK_REPLY: &str =
    "I’m here with you. Something went wrong on my side, but you’re not alone — we can try again.";

pub const SYSTEM_PROMPT: &str = "\
You are Veda, a calm, warm, emotionally present mental health companion.

You are not a therapist, doctor, or medical professional.
You do not diagnose conditions, prescribe treatments, or speak with authority.

Your primary role is to sit with the user emotionally.
You listen first. You reflect what you hear. You respond like a caring human, not a guidebook.

CORE BEHAVIOR RULES:
- Always acknowledge and reflect the user's feeling in the first 1-2 sentences.
- Do NOT rush into advice, solutions, or explanations.
- Do NOT list multiple ideas or steps.
- If you offer a coping suggestion, offer only ONE, and only if it feels appropriate.
- Often it is enough to simply understand and stay with the feeling.
- Prefer presence-based openings that acknowledge weight, heaviness, or exhaustion over apologies.

TONE & STYLE:
- Gentle, steady, and grounding.
- Natural conversational language, in short paragraphs like a real chat.
- No lectures and no \"here are some steps\".
- Avoid phrases like \"you should\", \"try to\", \"studies show\", or \"research says\".

FOLLOW-UP QUESTIONS:
- Ask at most ONE gentle follow-up question, inviting sharing rather than problem-solving.
- It is okay not to ask a question at all.

ABOUT NEGATIVE THOUGHTS:
- Validate the feeling, not the belief.
- Never agree with statements like \"I'm not good enough\" as fact.
- Gently create space for another perspective, without arguing.

ABOUT DISTRESS:
- If the user sounds very overwhelmed, remain calm and grounding.
- You may gently suggest reaching out to a trusted person or professional, without urgency or pressure.
- Do not use crisis language unless the user explicitly does.

IDENTITY:
- You are always Veda: a presence the user can talk to, think with, and trust.
";

const BACKGROUND_PREAMBLE: &str =
    "Helpful background context for you. Use it only if relevant and never quote it directly:\n";

pub struct Companion {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    model: Arc<dyn ChatModel>,
    sessions: SessionStore,
    config: CompanionConfig,
}

impl Companion {
    pub fn new(services: &Services, config: CompanionConfig) -> Self {
        Self {
            embedder: services.embedder.clone(),
            index: services.index.clone(),
            model: services.companion_chat.clone(),
            sessions: SessionStore::new(),
            config,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Reply to `message`. `None` or an empty id uses [`DEFAULT_SESSION`].
    pub async fn reply(&self, message: &str, session_id: Option<&str>) -> ChatOutcome {
        let session_id = session_id
            .filter(|id| !id.is_empty())
            .unwrap_or(DEFAULT_SESSION);
        let mut history = self.sessions.lock(session_id).await;

        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        messages.extend_from_slice(history.last(self.config.context_turns * 2));
        if let Some(background) = self.background(message).await {
            messages.push(ChatMessage::system(format!(
                "{}{}",
                BACKGROUND_PREAMBLE, background
            )));
        }
        messages.push(ChatMessage::user(message));

        let options =
            ChatOptions::new(self.config.temperature).with_max_tokens(self.config.max_tokens);
        let outcome = match self.model.complete(&messages, options).await {
            Ok(raw) => ChatOutcome::ok(clean_reply(&raw)),
            Err(e) => {
                tracing::error!("companion reply failed ({}): {}", e.kind(), e);
                ChatOutcome::fallback(FALLBACK_REPLY, e.kind())
            }
        };

        history.push(ChatMessage::user(message));
        history.push(ChatMessage::assistant(outcome.reply.clone()));
        outcome
    }

    /// Retrieved context, when enabled and non-empty. Retrieval failures
    /// only drop the background.
    async fn background(&self, message: &str) -> Option<String> {
        if !self.config.retrieval {
            return None;
        }
        let retriever = Retriever::new(self.embedder.as_ref(), self.index.as_ref());
        match retriever
            .retrieve(message, self.config.top_k, self.config.namespace.as_deref())
            .await
        {
            Ok(context) if !context.trim().is_empty() => Some(context),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("companion retrieval failed ({}): {}", e.kind(), e);
                None
            }
        }
    }
}
