// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
//! Multi-tenant vector storage
//!
//! Two interchangeable variants behind one trait:
//! - [`isolated::IsolatedDirStore`] keeps one physical collection per
//!   tenant on disk; isolation is physical partitioning.
//! - [`shared::SharedIndexStore`] keeps a single index for all tenants;
//!   isolation is a tenant-equality filter the store itself attaches to
//!   every read and delete, so call sites cannot forget it.
//!
//! `search_with_score` returns raw cosine distances (lower = closer); the
//! fallback policy derives similarity as `max(0, 1 - distance)`.

pub mod isolated;
pub mod shared;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::VectorBackendConfig;
use crate::embeddings::EmbeddingProvider;

pub use isolated::IsolatedDirStore;
pub use shared::{SharedIndexConfig, SharedIndexStore};

/// A pre-chunked slice of a source document, supplied by the ingestion
/// collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// One chunk returned from a similarity search.
///
/// `similarity` is derived from the raw distance as `max(0, 1 - distance)`;
/// it is never negative, but not guaranteed ≤ 1 unless the raw metric is a
/// proper distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub content: String,
    pub similarity: f32,
    pub metadata: HashMap<String, String>,
}

#[derive(Error, Debug)]
pub enum VectorStoreError {
    /// Missing or invalid backend parameters; raised eagerly at
    /// construction, never retried automatically.
    #[error("invalid vector store configuration: {0}")]
    Configuration(String),

    /// The backend rejected or failed a call; logged and re-raised, never
    /// swallowed (a swallowed delete failure leaves orphaned vectors).
    #[error("vector backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding model not ready after {waited_secs}s")]
    EmbeddingUnavailable { waited_secs: u64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Uniform tenant-scoped vector store contract.
///
/// Every operation takes the tenant id; cross-tenant leakage is a
/// correctness violation, not a performance concern.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed and index chunks for a tenant; returns the new record ids.
    async fn add_documents(
        &self,
        tenant_id: &str,
        chunks: &[DocumentChunk],
    ) -> Result<Vec<String>, VectorStoreError>;

    /// Remove every vector belonging to one document of one tenant.
    async fn delete_documents(
        &self,
        tenant_id: &str,
        document_id: &str,
    ) -> Result<(), VectorStoreError>;

    /// Top-k similarity search over one tenant's documents.
    async fn search(
        &self,
        tenant_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedDocument>, VectorStoreError>;

    /// Like [`search`](Self::search) but with the raw distance per result.
    async fn search_with_score(
        &self,
        tenant_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<(RetrievedDocument, f32)>, VectorStoreError>;

    /// Number of chunks indexed for a tenant.
    async fn count(&self, tenant_id: &str) -> Result<usize, VectorStoreError>;
}

/// Authoritative chunk-count collaborator, used when the shared index
/// cannot answer a tenant-scoped count natively.
#[async_trait]
pub trait ChunkCountProvider: Send + Sync {
    async fn total_chunk_count(&self, tenant_id: &str) -> Result<usize, VectorStoreError>;
}

/// Build the configured store variant. Fails fast on misconfiguration.
pub fn build_store(
    config: &VectorBackendConfig,
    provider: EmbeddingProvider,
    embedding_wait: std::time::Duration,
    counts: Option<Arc<dyn ChunkCountProvider>>,
) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
    match config {
        VectorBackendConfig::Isolated { data_dir } => Ok(Arc::new(IsolatedDirStore::new(
            data_dir.clone(),
            provider,
            embedding_wait,
        )?)),
        VectorBackendConfig::Shared {
            api_url,
            api_key,
            timeout,
            count_probe_limit,
        } => {
            let shared_config = SharedIndexConfig {
                backend: shared::SharedBackend::Remote {
                    api_url: api_url.clone(),
                },
                api_key: api_key.clone(),
                timeout: *timeout,
                count_probe_limit: *count_probe_limit,
            };
            Ok(Arc::new(SharedIndexStore::new(
                shared_config,
                provider,
                embedding_wait,
                counts,
            )?))
        }
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Similarity from a raw distance. Clamped below at zero only; scores ≤ 0
/// intentionally yield values above 1.0 (given behavior, tolerated by
/// callers).
pub fn similarity_from_distance(distance: f32) -> f32 {
    (1.0 - distance).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_basics() {
        let a = [1.0, 0.0, 0.0];
        let b = [1.0, 0.0, 0.0];
        let c = [0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &c).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_similarity_clamps_lower_bound_only() {
        assert_eq!(similarity_from_distance(0.2), 0.8);
        // Distance above 1 clamps to zero, never negative.
        assert_eq!(similarity_from_distance(1.7), 0.0);
        // Distance below 0 passes through above 1.0.
        assert!(similarity_from_distance(-0.5) > 1.0);
    }
}
