// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
//! Conversation session persistence
//!
//! Sessions are created lazily on the first persisted exchange and keyed by
//! an opaque id. The in-memory implementation backs tests and local runs;
//! production deployments swap in their own [`SessionStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::rag::{RetrievedDocument, ThinkingStep};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One persisted message of a session transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub retrieved_docs: Vec<RetrievedDocument>,
    #[serde(default)]
    pub thinking_process: Vec<ThinkingStep>,
    #[serde(default)]
    pub tokens_used: usize,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            retrieved_docs: Vec::new(),
            thinking_process: Vec::new(),
            tokens_used: 0,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(
        content: impl Into<String>,
        retrieved_docs: Vec<RetrievedDocument>,
        thinking_process: Vec<ThinkingStep>,
        tokens_used: usize,
    ) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            retrieved_docs,
            thinking_process,
            tokens_used,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session for a tenant, titled after the opening question.
    /// Returns the new session id.
    async fn create_session(
        &self,
        tenant_id: &str,
        first_question: &str,
    ) -> Result<String, SessionError>;

    async fn save_message(
        &self,
        session_id: &str,
        message: StoredMessage,
    ) -> Result<(), SessionError>;

    async fn session_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>, SessionError>;

    async fn session_tenant(&self, session_id: &str) -> Result<String, SessionError>;
}

struct SessionRecord {
    tenant_id: String,
    #[allow(dead_code)]
    title: String,
    messages: Vec<StoredMessage>,
}

/// Session store backed by process memory.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(
        &self,
        tenant_id: &str,
        first_question: &str,
    ) -> Result<String, SessionError> {
        let id = Uuid::new_v4().to_string();
        let mut title: String = first_question.chars().take(80).collect();
        if title.is_empty() {
            title = "New conversation".to_string();
        }
        self.sessions.write().await.insert(
            id.clone(),
            SessionRecord {
                tenant_id: tenant_id.to_string(),
                title,
                messages: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn save_message(
        &self,
        session_id: &str,
        message: StoredMessage,
    ) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        record.messages.push(message);
        Ok(())
    }

    async fn session_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>, SessionError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|r| r.messages.clone())
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    async fn session_tenant(&self, session_id: &str) -> Result<String, SessionError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|r| r.tenant_id.clone())
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }
}
