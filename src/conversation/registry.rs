// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
//! Conversation registry
//!
//! Owns every conversation and the focus pointer. All mutation goes
//! through `&mut self`, so the registry is plain data with no interior
//! locking; the single driving task (the UI loop in practice) is the only
//! writer.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{ChatMessage, Conversation, ConversationStatus};
use super::worker::spawn_worker;
use crate::rag::RagPipeline;
use crate::session::{SessionError, SessionStore, StoredMessage};

#[derive(Error, Debug)]
pub enum ConversationError {
    #[error("conversation not found: {0}")]
    NotFound(String),

    #[error("conversation {0} is still generating")]
    StillGenerating(String),

    #[error("conversation {0} ended with an error and cannot be continued")]
    Errored(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

pub struct ConversationRegistry {
    pub(crate) conversations: HashMap<String, Conversation>,
    pub(crate) current: Option<String>,
    pipeline: RagPipeline,
    pub(crate) sessions: Arc<dyn SessionStore>,
    pub(crate) notify: Arc<Notify>,
}

impl ConversationRegistry {
    pub fn new(pipeline: RagPipeline, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            conversations: HashMap::new(),
            current: None,
            pipeline,
            sessions,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Start a new conversation for a tenant and make it the focused one.
    /// Session persistence is best effort here; a failure is retried when
    /// the answer is persisted.
    pub async fn create_conversation(&mut self, tenant_id: &str, question: &str) -> String {
        let id = Conversation::new_id();

        let session_id = match self.sessions.create_session(tenant_id, question).await {
            Ok(session_id) => {
                if let Err(e) = self
                    .sessions
                    .save_message(&session_id, StoredMessage::user(question))
                    .await
                {
                    warn!(conversation = %id, error = %e, "failed to persist user message");
                }
                Some(session_id)
            }
            Err(e) => {
                warn!(conversation = %id, error = %e, "failed to create session, will retry on completion");
                None
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let worker = spawn_worker(
            self.pipeline.clone(),
            id.clone(),
            tenant_id.to_string(),
            question.to_string(),
            tx,
            Arc::clone(&self.notify),
            cancel.clone(),
        );

        let conversation = Conversation {
            id: id.clone(),
            tenant_id: tenant_id.to_string(),
            question: question.to_string(),
            messages: vec![ChatMessage {
                role: crate::session::MessageRole::User,
                content: question.to_string(),
            }],
            status: ConversationStatus::Generating,
            current_answer: String::new(),
            thinking: Vec::new(),
            pending_result: None,
            last_error: None,
            session_id,
            answer_persisted: false,
            created_at: chrono::Utc::now(),
            queue: rx,
            worker: Some(worker),
            cancel,
        };

        info!(conversation = %id, tenant = %tenant_id, "conversation started");
        self.conversations.insert(id.clone(), conversation);
        self.current = Some(id.clone());
        id
    }

    /// Ask a follow-up question on a completed conversation. The in-flight
    /// answer state is reset; the transcript is kept.
    pub async fn continue_conversation(
        &mut self,
        id: &str,
        question: &str,
    ) -> Result<(), ConversationError> {
        let notify = Arc::clone(&self.notify);
        let pipeline = self.pipeline.clone();
        let sessions = Arc::clone(&self.sessions);

        let conversation = self
            .conversations
            .get_mut(id)
            .ok_or_else(|| ConversationError::NotFound(id.to_string()))?;

        match conversation.status {
            ConversationStatus::Generating => {
                return Err(ConversationError::StillGenerating(id.to_string()))
            }
            ConversationStatus::Error => return Err(ConversationError::Errored(id.to_string())),
            ConversationStatus::Completed => {}
        }

        if let Some(session_id) = &conversation.session_id {
            if let Err(e) = sessions
                .save_message(session_id, StoredMessage::user(question))
                .await
            {
                warn!(conversation = %id, error = %e, "failed to persist user message");
            }
        }

        conversation.question = question.to_string();
        conversation.messages.push(ChatMessage {
            role: crate::session::MessageRole::User,
            content: question.to_string(),
        });
        conversation.status = ConversationStatus::Generating;
        conversation.current_answer.clear();
        conversation.thinking.clear();
        conversation.pending_result = None;
        conversation.last_error = None;
        conversation.answer_persisted = false;

        let (tx, rx) = mpsc::unbounded_channel();
        conversation.queue = rx;
        conversation.cancel = CancellationToken::new();
        conversation.worker = Some(spawn_worker(
            pipeline,
            id.to_string(),
            conversation.tenant_id.clone(),
            question.to_string(),
            tx,
            notify,
            conversation.cancel.clone(),
        ));

        info!(conversation = %id, "conversation continued");
        Ok(())
    }

    /// Reopen a persisted session as a completed conversation with its
    /// transcript loaded.
    pub async fn open_session(&mut self, session_id: &str) -> Result<String, ConversationError> {
        let tenant_id = self.sessions.session_tenant(session_id).await?;
        let stored = self.sessions.session_messages(session_id).await?;

        let question = stored
            .iter()
            .rev()
            .find(|m| m.role == crate::session::MessageRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let messages = stored
            .into_iter()
            .map(|m| ChatMessage {
                role: m.role,
                content: m.content,
            })
            .collect();

        // Closed queue, no worker: nothing is in flight for a reopened
        // conversation.
        let (_tx, rx) = mpsc::unbounded_channel();
        let id = Conversation::new_id();
        let conversation = Conversation {
            id: id.clone(),
            tenant_id,
            question,
            messages,
            status: ConversationStatus::Completed,
            current_answer: String::new(),
            thinking: Vec::new(),
            pending_result: None,
            last_error: None,
            session_id: Some(session_id.to_string()),
            answer_persisted: true,
            created_at: chrono::Utc::now(),
            queue: rx,
            worker: None,
            cancel: CancellationToken::new(),
        };

        info!(conversation = %id, session = %session_id, "session reopened");
        self.conversations.insert(id.clone(), conversation);
        self.current = Some(id.clone());
        Ok(id)
    }

    /// Request cancellation of an in-flight question. The worker exits
    /// cooperatively; the conversation is marked errored right away so the
    /// caller never observes a generating state with no worker.
    pub fn cancel(&mut self, id: &str) -> Result<(), ConversationError> {
        let conversation = self
            .conversations
            .get_mut(id)
            .ok_or_else(|| ConversationError::NotFound(id.to_string()))?;

        conversation.cancel.cancel();
        if conversation.is_generating() {
            conversation.status = ConversationStatus::Error;
            conversation.last_error = Some("cancelled".to_string());
            info!(conversation = %id, "generation cancelled");
        }
        Ok(())
    }

    /// Join worker tasks that have already finished, surfacing panics in
    /// the log instead of silently dropping them.
    pub async fn reap_finished(&mut self) {
        for conversation in self.conversations.values_mut() {
            let finished = conversation
                .worker
                .as_ref()
                .map(|w| w.is_finished())
                .unwrap_or(false);
            if !finished {
                continue;
            }
            if let Some(worker) = conversation.worker.take() {
                if let Err(e) = worker.await {
                    warn!(conversation = %conversation.id, error = %e, "worker task failed");
                } else {
                    debug!(conversation = %conversation.id, "worker reaped");
                }
            }
        }
    }

    pub fn clear_current(&mut self) {
        self.current = None;
    }

    pub fn set_current(&mut self, id: &str) -> Result<(), ConversationError> {
        if !self.conversations.contains_key(id) {
            return Err(ConversationError::NotFound(id.to_string()));
        }
        self.current = Some(id.to_string());
        Ok(())
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current(&self) -> Option<&Conversation> {
        self.current.as_ref().and_then(|id| self.conversations.get(id))
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.get_mut(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.conversations.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }
}
