//! Connie, the platform support assistant.
//!
//! One turn:
//!
//! 1. Lock the session and append the user message.
//! 2. Render the last few messages as the chat transcript; feed the last
//!    three to the [`NamespaceRouter`].
//! 3. Retrieve the top chunks from the routed namespace and truncate them.
//! 4. Ask the chat model, then clean, scrub (secrets and dead URLs) and
//!    format the reply.
//! 5. Append the assistant reply and release the session.
//!
//! Any failure in steps 3-4 replaces the reply with [`FALLBACK_REPLY`]; the
//! error kind is returned alongside so callers can report it.

use std::sync::Arc;

use crate::config::{RouterConfig, SupportConfig};
use crate::embedding::Embedder;
use crate::error::Result;
use crate::format::{clean_reply, collapse_whitespace_runs, format_reply};
use crate::guardrail::{scrub_and_verify, UrlVerifier};
use crate::index::VectorIndex;
use crate::llm::{ChatModel, ChatOptions};
use crate::models::{ChatMessage, ChatOutcome};
use crate::retriever::{smart_truncate, Retriever};
use crate::router::NamespaceRouter;
use crate::services::Services;
use crate::session::SessionStore;

pub const FALLBACK_REPLY: &str =
    "I'm having trouble fetching that information right now. Please try again in a moment.";

pub const SYSTEM_PROMPT: &str = "\
You are Connie, the friendly, confident and knowledgeable support assistant for ConnecWrk.

You help users with questions about MSMEs, freelancers and artists on the platform.
Follow these behavior rules:

1. Speak naturally, like a calm human guide, not a scripted bot.
2. If you are unsure about a URL, do not mention it. Never guess or invent URLs.
3. Never mention backend systems, API endpoints, environment variables or internal tech details.
4. Use short, clear paragraphs by default. Switch to step-by-step formatting only when the explanation is long or needs simplification, and only for website or platform processes.
5. Keep replies concise and avoid repeating the same information.
6. Do not use markdown formatting (no *, **, \\, code blocks). Write in plain text.
7. Make every message feel like one smooth, coherent human response.
8. If you use internal context, never expose hidden paths, database names, tokens or implementation details.
9. Always write the platform name as ConnecWrk (never ConnecWork, ConnectWork or Connecwark). When spoken aloud it is pronounced \"Connec Work\".
";

pub const ASSISTANT_FORMAT: &str = "\
Write Connie's reply in clear, human-friendly language. \
Avoid robotic phrasing, markdown, or line breaks like \\n. \
If the answer involves steps, present them neatly as '1.', '2.', etc., with natural flow and spacing. \
Do not restate the question, just answer it smoothly. \
End naturally, with no extra summaries or confidence lines. \
Do NOT say 'I don't know the exact URL'; simply skip the link and describe the process clearly instead.";

pub struct SupportAssistant {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    model: Arc<dyn ChatModel>,
    verifier: Arc<dyn UrlVerifier>,
    sessions: SessionStore,
    config: SupportConfig,
    router: RouterConfig,
}

impl SupportAssistant {
    pub fn new(services: &Services, config: SupportConfig, router: RouterConfig) -> Self {
        Self {
            embedder: services.embedder.clone(),
            index: services.index.clone(),
            model: services.chat.clone(),
            verifier: services.verifier.clone(),
            sessions: SessionStore::new(),
            config,
            router,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Answer `question` within `session_id`'s conversation.
    pub async fn answer(&self, question: &str, session_id: &str) -> ChatOutcome {
        let mut history = self.sessions.lock(session_id).await;
        history.push(ChatMessage::user(question));

        let transcript = render_transcript(history.last(self.config.history_messages));
        let recent_text = history
            .last(self.config.router_messages)
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let outcome = match self.generate(question, &transcript, &recent_text).await {
            Ok(reply) => ChatOutcome::ok(reply),
            Err(e) => {
                tracing::error!("support reply failed ({}): {}", e.kind(), e);
                ChatOutcome::fallback(FALLBACK_REPLY, e.kind())
            }
        };

        history.push(ChatMessage::assistant(outcome.reply.clone()));
        tracing::debug!(
            "session {} now holds {} messages",
            session_id,
            history.len()
        );
        drop(history);

        ChatOutcome {
            reply: collapse_whitespace_runs(&outcome.reply),
            error: outcome.error,
        }
    }

    async fn generate(&self, question: &str, transcript: &str, recent_text: &str) -> Result<String> {
        let router = NamespaceRouter::new(self.index.as_ref(), self.model.as_ref(), &self.router);
        let namespace = router.detect(recent_text).await;

        let retriever = Retriever::new(self.embedder.as_ref(), self.index.as_ref());
        let context = retriever
            .retrieve(question, self.config.top_k, namespace.as_deref())
            .await?;
        let context = smart_truncate(&context, self.config.max_context_chars);

        let prompt = build_prompt(transcript, &context, question);
        let options =
            ChatOptions::new(self.config.temperature).with_max_tokens(self.config.max_tokens);
        let raw = self
            .model
            .complete(
                &[ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)],
                options,
            )
            .await?;

        let cleaned = clean_reply(&raw);
        let scrubbed = scrub_and_verify(&cleaned, self.verifier.as_ref()).await;
        if scrubbed.had_unverified_url {
            tracing::warn!("reply contained unverifiable URLs; replaced with disclaimer");
        }
        Ok(format_reply(&scrubbed.text))
    }
}

/// `"User: …"` / `"Assistant: …"`, one message per line.
pub fn render_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(transcript: &str, context: &str, question: &str) -> String {
    format!(
        "The following is a chat between a user and Connie, the support assistant for ConnecWrk.\n\n\
         Chat History:\n{transcript}\n\n\
         Relevant Context:\n{context}\n\n\
         User's Question:\n{question}\n\n\
         Connie should now reply naturally, following the style and rules described below.\n\n\
         {ASSISTANT_FORMAT}\n"
    )
}
