// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
//! Per-conversation state owned by the registry.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::rag::{QueryResult, ThinkingStep};
use crate::session::MessageRole;

/// Lifecycle of one question within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationStatus {
    Generating,
    Completed,
    Error,
}

/// A completed exchange line in the transcript.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

/// One update produced by a conversation worker, consumed in FIFO order by
/// the dispatcher.
#[derive(Debug, Clone)]
pub enum ConversationUpdate {
    Thinking(Vec<ThinkingStep>),
    Chunk(String),
    Complete(QueryResult),
    Error(String),
}

/// One conversation: transcript, in-flight answer state, and the worker
/// plumbing feeding it. Owned exclusively by the registry; the dispatcher
/// borrows it mutably to apply updates.
pub struct Conversation {
    pub id: String,
    pub tenant_id: String,
    /// The question currently being answered (or last answered).
    pub question: String,
    pub messages: Vec<ChatMessage>,
    pub status: ConversationStatus,
    /// Chunks accumulated so far for the in-flight answer.
    pub current_answer: String,
    pub thinking: Vec<ThinkingStep>,
    /// Full result of the last completed question, kept until persisted
    /// and displayed.
    pub pending_result: Option<QueryResult>,
    pub last_error: Option<String>,
    pub session_id: Option<String>,
    /// Guards against double-writing the assistant message. Stays false on
    /// persistence failure so the next drain retries.
    pub answer_persisted: bool,
    pub created_at: DateTime<Utc>,
    pub(crate) queue: mpsc::UnboundedReceiver<ConversationUpdate>,
    pub(crate) worker: Option<JoinHandle<()>>,
    pub(crate) cancel: CancellationToken,
}

impl Conversation {
    pub(crate) fn new_id() -> String {
        format!("conv_{}", &Uuid::new_v4().simple().to_string()[..8])
    }

    pub fn is_generating(&self) -> bool {
        self.status == ConversationStatus::Generating
    }

    /// True when the worker has enqueued updates not yet applied.
    pub fn has_pending_updates(&self) -> bool {
        !self.queue.is_empty()
    }
}
