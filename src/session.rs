//! In-memory conversation sessions.
//!
//! Each session id maps to its own `tokio::sync::Mutex<History>`.
//! A chat turn holds that lock from reading history until the assistant
//! reply is appended, so concurrent requests for one session are
//! serialized while different sessions run in parallel. The outer
//! `DashMap` only guards creation and lookup of the per-session handles.
//!
//! Nothing is persisted and nothing is evicted: history lives until the
//! process exits.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::ChatMessage;

/// Session used when a caller sends none.
pub const DEFAULT_SESSION: &str = "local";

/// Ordered message history of one session.
#[derive(Debug, Default, Clone)]
pub struct History {
    messages: Vec<ChatMessage>,
}

impl History {
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The last `n` messages in insertion order.
    pub fn last(&self, n: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }
}

/// Exclusive access to one session's history for the duration of a turn.
pub type SessionGuard = OwnedMutexGuard<History>;

#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Mutex<History>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the session's history, creating an empty one on first use.
    pub async fn lock(&self, session_id: &str) -> SessionGuard {
        let handle = self
            .sessions
            .entry(session_id.to_string())
            .or_default()
            .clone();
        // the DashMap shard guard is released before awaiting
        handle.lock_owned().await
    }

    /// Copy of a session's messages, or `None` for an unknown id.
    pub async fn snapshot(&self, session_id: &str) -> Option<Vec<ChatMessage>> {
        let handle = self.sessions.get(session_id)?.clone();
        let history = handle.lock().await;
        Some(history.messages().to_vec())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
