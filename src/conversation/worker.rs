// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
//! Conversation worker task
//!
//! One task per in-flight question. The worker drives the pipeline's event
//! stream, translates events into [`ConversationUpdate`]s on the owning
//! conversation's queue, and wakes the dispatcher after every enqueue.
//! Cancellation is cooperative through the conversation's token; a
//! cancelled worker exits without emitting a terminal update.

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::state::ConversationUpdate;
use crate::rag::{PipelineEvent, RagPipeline};

pub(crate) fn spawn_worker(
    pipeline: RagPipeline,
    conversation_id: String,
    tenant_id: String,
    question: String,
    tx: mpsc::UnboundedSender<ConversationUpdate>,
    notify: Arc<Notify>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = pipeline.query_stream(&tenant_id, &question);

        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(conversation = %conversation_id, "worker cancelled");
                    return;
                }
                item = events.next() => item,
            };

            let update = match item {
                // Producer exhausted without a terminal event; nothing left
                // to report.
                None => return,
                Some(Ok(PipelineEvent::Thinking { steps })) => ConversationUpdate::Thinking(steps),
                Some(Ok(PipelineEvent::Chunk { content })) => ConversationUpdate::Chunk(content),
                Some(Ok(PipelineEvent::Complete { result })) => ConversationUpdate::Complete(result),
                Some(Err(e)) => {
                    warn!(conversation = %conversation_id, error = %e, "query failed");
                    ConversationUpdate::Error(e.user_message())
                }
            };
            let terminal = matches!(
                update,
                ConversationUpdate::Complete(_) | ConversationUpdate::Error(_)
            );

            if tx.send(update).is_err() {
                debug!(conversation = %conversation_id, "queue closed, worker exiting");
                return;
            }
            notify.notify_one();

            if terminal {
                return;
            }
        }
    })
}
