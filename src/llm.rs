// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
//! Language model collaborator contract
//!
//! The engine treats the model as an opaque service: one rendered prompt
//! in, either a single string or a finite ordered sequence of string
//! increments out. Concatenating the streamed increments must equal the
//! non-streaming answer for the same prompt.

use async_trait::async_trait;
use thiserror::Error;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("model request failed: {0}")]
    Request(String),
    #[error("model stream interrupted: {0}")]
    Stream(String),
}

/// Ordered, finite sequence of answer increments. One-shot per question.
pub type ChunkStream = ReceiverStream<Result<String, LlmError>>;

/// Opaque language model client. No timeout is enforced on calls here; the
/// caller owns that decision.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate the full answer in one call.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;

    /// Stream the answer as ordered increments; terminates when the model
    /// signals completion.
    async fn generate_stream(&self, prompt: &str) -> Result<ChunkStream, LlmError>;
}
