// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
//! Streaming multi-tenant RAG query orchestration.
//!
//! The crate retrieves tenant-scoped context from a vector store, routes
//! each question between grounded and general-knowledge answering, streams
//! the generated answer, and manages concurrent conversations with
//! idempotent session persistence.

pub mod config;
pub mod conversation;
pub mod embeddings;
pub mod llm;
pub mod rag;
pub mod session;
pub mod vector;

pub use config::{AppConfig, RagConfig, VectorBackendConfig};
pub use conversation::{
    ConversationRegistry, ConversationStatus, RedrawSignal, UpdateDispatcher,
};
pub use embeddings::{EmbeddingProvider, LoadStatus};
pub use llm::{ChunkStream, LlmClient, LlmError};
pub use rag::{PipelineEvent, QueryResult, RagError, RagPipeline, ThinkingStep};
pub use session::{InMemorySessionStore, SessionStore, StoredMessage};
pub use vector::{
    build_store, DocumentChunk, IsolatedDirStore, RetrievedDocument, SharedIndexStore,
    VectorStore, VectorStoreError,
};
