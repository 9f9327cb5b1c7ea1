// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
//! Shared test doubles for the integration suites.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use ragstream::config::RagConfig;
use ragstream::embeddings::{EmbeddingConfig, EmbeddingProvider, LocalEmbeddingModel};
use ragstream::llm::{ChunkStream, LlmClient, LlmError};
use ragstream::session::{InMemorySessionStore, SessionError, SessionStore, StoredMessage};
use ragstream::vector::{DocumentChunk, RetrievedDocument, VectorStore, VectorStoreError};
use ragstream::RagPipeline;

/// Opt-in log output for debugging a failing test, driven by RUST_LOG.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn preloaded_provider() -> EmbeddingProvider {
    EmbeddingProvider::preloaded(Arc::new(
        LocalEmbeddingModel::new(EmbeddingConfig::default()).unwrap(),
    ))
}

pub fn test_config(similarity_threshold: f32) -> RagConfig {
    RagConfig {
        retrieval_k: 4,
        fallback_enabled: true,
        similarity_threshold,
        embedding_wait: Duration::from_secs(5),
    }
}

pub fn pipeline(
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn LlmClient>,
    similarity_threshold: f32,
) -> RagPipeline {
    RagPipeline::new(store, llm, test_config(similarity_threshold))
}

pub fn doc_chunk(document_id: &str, chunk_index: usize, text: &str) -> DocumentChunk {
    DocumentChunk {
        document_id: document_id.to_string(),
        chunk_index,
        text: text.to_string(),
        metadata: HashMap::new(),
    }
}

/// Vector store that returns a fixed scored result set, so tests control
/// raw distances exactly.
pub struct StubStore {
    pub results: Vec<(RetrievedDocument, f32)>,
}

impl StubStore {
    pub fn empty() -> Self {
        Self { results: Vec::new() }
    }

    pub fn with_distances(distances: &[f32]) -> Self {
        let results = distances
            .iter()
            .enumerate()
            .map(|(i, d)| {
                (
                    RetrievedDocument {
                        content: format!("stub content {}", i),
                        similarity: (1.0 - d).max(0.0),
                        metadata: HashMap::new(),
                    },
                    *d,
                )
            })
            .collect();
        Self { results }
    }
}

#[async_trait]
impl VectorStore for StubStore {
    async fn add_documents(
        &self,
        _tenant_id: &str,
        _chunks: &[DocumentChunk],
    ) -> Result<Vec<String>, VectorStoreError> {
        Ok(Vec::new())
    }

    async fn delete_documents(
        &self,
        _tenant_id: &str,
        _document_id: &str,
    ) -> Result<(), VectorStoreError> {
        Ok(())
    }

    async fn search(
        &self,
        _tenant_id: &str,
        _query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedDocument>, VectorStoreError> {
        Ok(self
            .results
            .iter()
            .take(k)
            .map(|(doc, _)| doc.clone())
            .collect())
    }

    async fn search_with_score(
        &self,
        _tenant_id: &str,
        _query: &str,
        k: usize,
    ) -> Result<Vec<(RetrievedDocument, f32)>, VectorStoreError> {
        Ok(self.results.iter().take(k).cloned().collect())
    }

    async fn count(&self, _tenant_id: &str) -> Result<usize, VectorStoreError> {
        Ok(self.results.len())
    }
}

/// Streams a fixed chunk script; the blocking path returns the
/// concatenation.
pub struct ScriptedLlm {
    pub chunks: Vec<String>,
}

impl ScriptedLlm {
    pub fn new(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        Ok(self.chunks.concat())
    }

    async fn generate_stream(&self, _prompt: &str) -> Result<ChunkStream, LlmError> {
        let (tx, rx) = mpsc::channel(16);
        let chunks = self.chunks.clone();
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
        });
        Ok(ReceiverStream::new(rx))
    }
}

/// Answers with the prompt it was given, for asserting prompt assembly.
pub struct EchoLlm;

#[async_trait]
impl LlmClient for EchoLlm {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        Ok(prompt.to_string())
    }

    async fn generate_stream(&self, prompt: &str) -> Result<ChunkStream, LlmError> {
        let (tx, rx) = mpsc::channel(1);
        let prompt = prompt.to_string();
        tokio::spawn(async move {
            let _ = tx.send(Ok(prompt)).await;
        });
        Ok(ReceiverStream::new(rx))
    }
}

/// Emits one chunk, then fails the stream.
pub struct FailingStreamLlm;

#[async_trait]
impl LlmClient for FailingStreamLlm {
    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::Request("backend unavailable".to_string()))
    }

    async fn generate_stream(&self, _prompt: &str) -> Result<ChunkStream, LlmError> {
        let (tx, rx) = mpsc::channel(2);
        tokio::spawn(async move {
            let _ = tx.send(Ok("partial".to_string())).await;
            let _ = tx
                .send(Err(LlmError::Stream("connection reset".to_string())))
                .await;
        });
        Ok(ReceiverStream::new(rx))
    }
}

/// Emits one chunk immediately, then stalls until dropped. Used to hold a
/// conversation in the generating state.
pub struct StallingLlm;

#[async_trait]
impl LlmClient for StallingLlm {
    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        Ok("stalled".to_string())
    }

    async fn generate_stream(&self, _prompt: &str) -> Result<ChunkStream, LlmError> {
        let (tx, rx) = mpsc::channel(2);
        tokio::spawn(async move {
            let _ = tx.send(Ok("partial".to_string())).await;
            tokio::time::sleep(Duration::from_secs(600)).await;
        });
        Ok(ReceiverStream::new(rx))
    }
}

/// Session store that fails the first `failures` message saves, then
/// delegates to an in-memory store. Counts assistant saves for
/// idempotency assertions.
pub struct FlakySessionStore {
    inner: InMemorySessionStore,
    failures: AtomicUsize,
    pub save_attempts: AtomicUsize,
}

impl FlakySessionStore {
    pub fn failing_first(failures: usize) -> Self {
        Self {
            inner: InMemorySessionStore::new(),
            failures: AtomicUsize::new(failures),
            save_attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SessionStore for FlakySessionStore {
    async fn create_session(
        &self,
        tenant_id: &str,
        first_question: &str,
    ) -> Result<String, SessionError> {
        self.inner.create_session(tenant_id, first_question).await
    }

    async fn save_message(
        &self,
        session_id: &str,
        message: StoredMessage,
    ) -> Result<(), SessionError> {
        use ragstream::session::MessageRole;
        if message.role == MessageRole::Assistant {
            self.save_attempts.fetch_add(1, Ordering::SeqCst);
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(SessionError::Backend("simulated outage".to_string()));
            }
        }
        self.inner.save_message(session_id, message).await
    }

    async fn session_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>, SessionError> {
        self.inner.session_messages(session_id).await
    }

    async fn session_tenant(&self, session_id: &str) -> Result<String, SessionError> {
        self.inner.session_tenant(session_id).await
    }
}
