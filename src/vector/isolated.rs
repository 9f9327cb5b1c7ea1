// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
//! Variant A: one physical collection per tenant
//!
//! Each tenant owns a directory under the data root; nothing is filtered at
//! query time because nothing is shared. Collection handles are cached for
//! the process lifetime - opening one reads its record file from disk, so
//! creation is the only expensive step and happens behind a lock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{
    cosine_similarity, similarity_from_distance, DocumentChunk, RetrievedDocument, VectorStore,
    VectorStoreError,
};
use crate::embeddings::EmbeddingProvider;

/// One indexed chunk as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub tenant_id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub vector: Vec<f32>,
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

struct TenantCollection {
    path: PathBuf,
    records: Vec<VectorRecord>,
}

impl TenantCollection {
    async fn open(path: PathBuf) -> Result<Self, VectorStoreError> {
        let file = path.join("records.json");
        let records = if file.exists() {
            let bytes = tokio::fs::read(&file).await?;
            serde_json::from_slice(&bytes)?
        } else {
            Vec::new()
        };
        Ok(Self { path, records })
    }

    async fn persist(&self) -> Result<(), VectorStoreError> {
        tokio::fs::create_dir_all(&self.path).await?;
        let bytes = serde_json::to_vec(&self.records)?;
        tokio::fs::write(self.path.join("records.json"), bytes).await?;
        Ok(())
    }
}

/// Per-tenant-directory vector store.
pub struct IsolatedDirStore {
    data_dir: PathBuf,
    provider: EmbeddingProvider,
    embedding_wait: Duration,
    // Create-if-absent is the only shared mutation; the outer lock keeps
    // concurrent first access from opening the same collection twice.
    collections: Mutex<HashMap<String, Arc<Mutex<TenantCollection>>>>,
}

impl IsolatedDirStore {
    pub fn new(
        data_dir: PathBuf,
        provider: EmbeddingProvider,
        embedding_wait: Duration,
    ) -> Result<Self, VectorStoreError> {
        std::fs::create_dir_all(&data_dir).map_err(|e| {
            VectorStoreError::Configuration(format!(
                "cannot create vector data dir {}: {}",
                data_dir.display(),
                e
            ))
        })?;
        Ok(Self {
            data_dir,
            provider,
            embedding_wait,
            collections: Mutex::new(HashMap::new()),
        })
    }

    /// Deterministic collection directory for a tenant.
    pub fn collection_dir(&self, tenant_id: &str) -> PathBuf {
        self.data_dir
            .join(format!("tenant_{}_collection", sanitize(tenant_id)))
    }

    async fn collection(
        &self,
        tenant_id: &str,
    ) -> Result<Arc<Mutex<TenantCollection>>, VectorStoreError> {
        let mut cache = self.collections.lock().await;
        if let Some(handle) = cache.get(tenant_id) {
            return Ok(handle.clone());
        }
        let path = self.collection_dir(tenant_id);
        let collection = TenantCollection::open(path).await?;
        info!(tenant = %tenant_id, records = collection.records.len(), "opened tenant collection");
        let handle = Arc::new(Mutex::new(collection));
        cache.insert(tenant_id.to_string(), handle.clone());
        Ok(handle)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VectorStoreError> {
        let model = self
            .provider
            .ready_model(self.embedding_wait)
            .await
            .ok_or(VectorStoreError::EmbeddingUnavailable {
                waited_secs: self.embedding_wait.as_secs(),
            })?;
        model
            .embed_batch(texts)
            .await
            .map_err(|e| VectorStoreError::Backend(format!("embedding failed: {}", e)))
    }

    /// Drop cached collection handles, for one tenant or all of them.
    pub async fn clear_cache(&self, tenant_id: Option<&str>) {
        let mut cache = self.collections.lock().await;
        match tenant_id {
            Some(id) => {
                cache.remove(id);
            }
            None => cache.clear(),
        }
    }
}

fn sanitize(tenant_id: &str) -> String {
    tenant_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[async_trait]
impl VectorStore for IsolatedDirStore {
    async fn add_documents(
        &self,
        tenant_id: &str,
        chunks: &[DocumentChunk],
    ) -> Result<Vec<String>, VectorStoreError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed(&texts).await?;

        for vector in &vectors {
            if vector.iter().any(|v| v.is_nan() || v.is_infinite()) {
                return Err(VectorStoreError::InvalidInput(
                    "embedding contains NaN or Infinity".to_string(),
                ));
            }
        }

        let handle = self.collection(tenant_id).await?;
        let mut collection = handle.lock().await;
        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.iter().zip(vectors) {
            let id = Uuid::new_v4().to_string();
            collection.records.push(VectorRecord {
                id: id.clone(),
                tenant_id: tenant_id.to_string(),
                document_id: chunk.document_id.clone(),
                chunk_index: chunk.chunk_index,
                vector,
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
            });
            ids.push(id);
        }
        collection.persist().await?;
        debug!(tenant = %tenant_id, added = ids.len(), "indexed chunks");
        Ok(ids)
    }

    async fn delete_documents(
        &self,
        tenant_id: &str,
        document_id: &str,
    ) -> Result<(), VectorStoreError> {
        let handle = self.collection(tenant_id).await?;
        let mut collection = handle.lock().await;
        let before = collection.records.len();
        collection.records.retain(|r| r.document_id != document_id);
        let removed = before - collection.records.len();
        if let Err(e) = collection.persist().await {
            error!(tenant = %tenant_id, document = %document_id, error = %e, "vector delete failed");
            return Err(e);
        }
        debug!(tenant = %tenant_id, document = %document_id, removed, "deleted document vectors");
        Ok(())
    }

    async fn search(
        &self,
        tenant_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedDocument>, VectorStoreError> {
        let scored = self.search_with_score(tenant_id, query, k).await?;
        Ok(scored.into_iter().map(|(doc, _)| doc).collect())
    }

    async fn search_with_score(
        &self,
        tenant_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<(RetrievedDocument, f32)>, VectorStoreError> {
        let query_vector = self
            .embed(std::slice::from_ref(&query.to_string()))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| VectorStoreError::Backend("empty embedding batch".to_string()))?;

        let handle = self.collection(tenant_id).await?;
        let collection = handle.lock().await;

        let mut scored: Vec<(RetrievedDocument, f32)> = collection
            .records
            .iter()
            .map(|record| {
                let distance = 1.0 - cosine_similarity(&query_vector, &record.vector);
                let mut metadata = record.metadata.clone();
                metadata.insert("document_id".to_string(), record.document_id.clone());
                metadata.insert("chunk_index".to_string(), record.chunk_index.to_string());
                (
                    RetrievedDocument {
                        content: record.text.clone(),
                        similarity: round2(similarity_from_distance(distance)),
                        metadata,
                    },
                    distance,
                )
            })
            .collect();

        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self, tenant_id: &str) -> Result<usize, VectorStoreError> {
        let handle = self.collection(tenant_id).await?;
        let collection = handle.lock().await;
        Ok(collection.records.len())
    }
}

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}
