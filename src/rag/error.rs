// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
//! Error types for the RAG query pipeline
//!
//! One taxonomy for everything a question can die of:
//! - Configuration errors (bad backend parameters, raised eagerly)
//! - Retrieval errors (vector store query/delete failures)
//! - Generation errors (language model failures mid-stream)
//! - Embedding readiness timeouts (the bounded wait expired)

use thiserror::Error;

use crate::llm::LlmError;
use crate::vector::VectorStoreError;

/// Errors surfaced by [`RagPipeline`](crate::rag::RagPipeline) operations.
///
/// Inside `query_stream` any of these terminates the event sequence; a
/// terminal error is never followed by a `Complete` event.
#[derive(Error, Debug)]
pub enum RagError {
    /// Missing or invalid configuration, detected at construction time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The vector store failed while retrieving or deleting documents.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// The language model call failed, possibly mid-stream.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The embedding model did not become ready within the bounded wait.
    #[error("embedding model not ready after {waited_secs}s")]
    EmbeddingUnavailable { waited_secs: u64 },
}

impl From<VectorStoreError> for RagError {
    fn from(err: VectorStoreError) -> Self {
        match err {
            VectorStoreError::Configuration(msg) => RagError::Configuration(msg),
            VectorStoreError::EmbeddingUnavailable { waited_secs } => {
                RagError::EmbeddingUnavailable { waited_secs }
            }
            other => RagError::Retrieval(other.to_string()),
        }
    }
}

impl From<LlmError> for RagError {
    fn from(err: LlmError) -> Self {
        RagError::Generation(err.to_string())
    }
}

impl RagError {
    /// Get user-friendly error message to show in place of the answer
    pub fn user_message(&self) -> String {
        match self {
            RagError::Configuration(_) => {
                "The knowledge base backend is misconfigured".to_string()
            }
            RagError::Retrieval(_) => {
                "Searching the knowledge base failed - please resubmit".to_string()
            }
            RagError::Generation(_) => {
                "Answer generation failed - please resubmit".to_string()
            }
            RagError::EmbeddingUnavailable { waited_secs } => {
                format!("The embedding model is still loading (waited {}s)", waited_secs)
            }
        }
    }

    /// Get error code for logging and metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            RagError::Configuration(_) => "CONFIGURATION",
            RagError::Retrieval(_) => "RETRIEVAL",
            RagError::Generation(_) => "GENERATION",
            RagError::EmbeddingUnavailable { .. } => "EMBEDDING_UNAVAILABLE",
        }
    }

    /// Check if resubmitting the question may succeed.
    ///
    /// Configuration errors are fatal until the deployment changes; the
    /// rest are transient from the user's point of view.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RagError::Configuration(_))
    }
}
