// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
//! Update dispatcher
//!
//! Drains worker queues into conversation state from the single driving
//! task. Draining is bounded per conversation per pass so one chatty
//! worker cannot starve the others, and the focused conversation is always
//! drained first.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, warn};

use super::registry::ConversationRegistry;
use super::state::{ChatMessage, Conversation, ConversationStatus, ConversationUpdate};
use crate::session::{MessageRole, SessionStore, StoredMessage};

/// What the caller should do with the screen after a drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedrawSignal {
    /// Updates are waiting; redraw now.
    Immediate,
    /// Generation is in flight but quiet; redraw after the delay.
    Delayed(Duration),
    /// Nothing in flight; no redraw needed.
    None,
}

#[derive(Debug, Clone)]
pub struct UpdateDispatcher {
    pub batch_size: usize,
    pub idle_redraw_delay: Duration,
}

impl Default for UpdateDispatcher {
    fn default() -> Self {
        Self {
            batch_size: 10,
            idle_redraw_delay: Duration::from_millis(50),
        }
    }
}

impl UpdateDispatcher {
    pub fn new(batch_size: usize, idle_redraw_delay: Duration) -> Self {
        Self {
            batch_size,
            idle_redraw_delay,
        }
    }

    /// Apply queued updates to every conversation, focused first, at most
    /// `batch_size` per conversation. Returns the number of updates
    /// applied.
    pub async fn drain(&self, registry: &mut ConversationRegistry) -> usize {
        let mut order: Vec<String> = Vec::with_capacity(registry.conversations.len());
        if let Some(current) = registry.current.clone() {
            order.push(current);
        }
        for id in registry.conversations.keys() {
            if registry.current.as_deref() != Some(id) {
                order.push(id.clone());
            }
        }

        let sessions = Arc::clone(&registry.sessions);
        let mut applied = 0;
        for id in order {
            let Some(conversation) = registry.conversations.get_mut(&id) else {
                continue;
            };
            applied += self.drain_one(conversation, sessions.as_ref()).await;
        }
        applied
    }

    async fn drain_one(
        &self,
        conversation: &mut Conversation,
        sessions: &dyn SessionStore,
    ) -> usize {
        let mut applied = 0;
        while applied < self.batch_size {
            let update = match conversation.queue.try_recv() {
                Ok(update) => update,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };
            applied += 1;

            match update {
                ConversationUpdate::Thinking(steps) => {
                    conversation.thinking = steps;
                }
                ConversationUpdate::Chunk(content) => {
                    conversation.current_answer.push_str(&content);
                }
                ConversationUpdate::Complete(result) => {
                    // The result's answer is authoritative over the chunk
                    // accumulator.
                    conversation.current_answer = result.answer.clone();
                    conversation.thinking = result.thinking_process.clone();
                    conversation.messages.push(ChatMessage {
                        role: MessageRole::Assistant,
                        content: result.answer.clone(),
                    });
                    conversation.status = ConversationStatus::Completed;
                    conversation.pending_result = Some(result);
                    break;
                }
                ConversationUpdate::Error(message) => {
                    warn!(conversation = %conversation.id, error = %message, "conversation errored");
                    conversation.status = ConversationStatus::Error;
                    conversation.last_error = Some(message);
                    break;
                }
            }
        }

        // Runs on every pass, not just the one that saw Complete, so a
        // failed persistence is retried until it sticks.
        if conversation.status == ConversationStatus::Completed && !conversation.answer_persisted {
            self.persist_answer(conversation, sessions).await;
        }
        applied
    }

    // Idempotent: guarded by `answer_persisted`, which is only set after
    // the assistant message is stored. Failures leave the guard false so
    // a later pass retries.
    async fn persist_answer(&self, conversation: &mut Conversation, sessions: &dyn SessionStore) {
        if conversation.answer_persisted {
            return;
        }
        let Some(result) = conversation.pending_result.clone() else {
            return;
        };

        let session_id = match &conversation.session_id {
            Some(id) => id.clone(),
            None => {
                // Session creation failed earlier; retry it now, together
                // with the user message that never made it in.
                let session_id = match sessions
                    .create_session(&conversation.tenant_id, &conversation.question)
                    .await
                {
                    Ok(id) => id,
                    Err(e) => {
                        warn!(conversation = %conversation.id, error = %e, "session create retry failed");
                        return;
                    }
                };
                if let Err(e) = sessions
                    .save_message(&session_id, StoredMessage::user(&conversation.question))
                    .await
                {
                    warn!(conversation = %conversation.id, error = %e, "failed to persist user message");
                }
                conversation.session_id = Some(session_id.clone());
                session_id
            }
        };

        let message = StoredMessage::assistant(
            result.answer,
            result.retrieved_docs,
            result.thinking_process,
            result.tokens_used,
        );
        match sessions.save_message(&session_id, message).await {
            Ok(()) => {
                conversation.answer_persisted = true;
                debug!(conversation = %conversation.id, session = %session_id, "answer persisted");
            }
            Err(e) => {
                warn!(conversation = %conversation.id, error = %e, "failed to persist answer, will retry");
            }
        }
    }

    /// Redraw decision for the focused conversation after a drain pass.
    pub fn redraw(&self, registry: &ConversationRegistry) -> RedrawSignal {
        match registry.current() {
            Some(conversation) if conversation.is_generating() => {
                if conversation.has_pending_updates() {
                    RedrawSignal::Immediate
                } else {
                    RedrawSignal::Delayed(self.idle_redraw_delay)
                }
            }
            _ => RedrawSignal::None,
        }
    }

    /// Block until a worker enqueues an update or the timeout elapses.
    /// Returns true when woken by an update.
    pub async fn wait_for_updates(
        &self,
        registry: &ConversationRegistry,
        timeout: Duration,
    ) -> bool {
        tokio::time::timeout(timeout, registry.notify.notified())
            .await
            .is_ok()
    }
}
