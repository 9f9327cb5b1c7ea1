// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
//! Variant B: one shared index, tenant-filtered
//!
//! All tenants live in a single physical index. Every write attaches the
//! tenant id to record metadata and every read or delete goes through a
//! filter this store builds from its `tenant_id` argument - callers never
//! assemble the filter, so omitting it is structurally impossible.
//!
//! The backend is either an in-process mock index (tests, local runs) or a
//! remote vector-db service over HTTP, selected at construction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::{
    cosine_similarity, similarity_from_distance, ChunkCountProvider, DocumentChunk,
    RetrievedDocument, VectorStore, VectorStoreError,
};
use crate::embeddings::EmbeddingProvider;

pub const TENANT_KEY: &str = "tenant_id";
const DOCUMENT_KEY: &str = "document_id";

#[derive(Debug, Clone)]
pub enum SharedBackend {
    Mock,
    Remote { api_url: String },
}

#[derive(Debug, Clone)]
pub struct SharedIndexConfig {
    pub backend: SharedBackend,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub count_probe_limit: usize,
}

impl Default for SharedIndexConfig {
    fn default() -> Self {
        Self {
            backend: SharedBackend::Mock,
            api_key: None,
            timeout: Duration::from_secs(5),
            count_probe_limit: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireRecord {
    id: String,
    vector: Vec<f32>,
    text: String,
    metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireSearchHit {
    #[allow(dead_code)]
    id: String,
    distance: f32,
    text: String,
    metadata: HashMap<String, String>,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    k: usize,
    filter: HashMap<String, String>,
}

#[derive(Serialize)]
struct DeleteRequest {
    filter: HashMap<String, String>,
}

// In-process shared index used by the mock backend.
struct MockIndex {
    records: RwLock<HashMap<String, WireRecord>>,
}

impl MockIndex {
    fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    fn matches(record: &WireRecord, filter: &HashMap<String, String>) -> bool {
        filter
            .iter()
            .all(|(key, value)| record.metadata.get(key) == Some(value))
    }

    async fn insert_batch(&self, batch: Vec<WireRecord>) {
        let mut records = self.records.write().await;
        for record in batch {
            records.insert(record.id.clone(), record);
        }
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: &HashMap<String, String>,
    ) -> Vec<WireSearchHit> {
        let records = self.records.read().await;
        let mut hits: Vec<WireSearchHit> = records
            .values()
            .filter(|record| Self::matches(record, filter))
            .map(|record| WireSearchHit {
                id: record.id.clone(),
                distance: 1.0 - cosine_similarity(query, &record.vector),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        hits
    }

    async fn delete_where(&self, filter: &HashMap<String, String>) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| !Self::matches(record, filter));
        before - records.len()
    }
}

/// Shared-index vector store with mandatory tenant filtering.
pub struct SharedIndexStore {
    config: SharedIndexConfig,
    http: reqwest::Client,
    mock: Option<Arc<MockIndex>>,
    provider: EmbeddingProvider,
    embedding_wait: Duration,
    counts: Option<Arc<dyn ChunkCountProvider>>,
}

impl SharedIndexStore {
    pub fn new(
        config: SharedIndexConfig,
        provider: EmbeddingProvider,
        embedding_wait: Duration,
        counts: Option<Arc<dyn ChunkCountProvider>>,
    ) -> Result<Self, VectorStoreError> {
        if let SharedBackend::Remote { api_url } = &config.backend {
            if api_url.is_empty() {
                return Err(VectorStoreError::Configuration(
                    "shared vector backend selected but VECTOR_DB_URL is not set".to_string(),
                ));
            }
            reqwest::Url::parse(api_url).map_err(|e| {
                VectorStoreError::Configuration(format!("invalid vector db url: {}", e))
            })?;
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                VectorStoreError::Configuration(format!("cannot build http client: {}", e))
            })?;

        let mock = match config.backend {
            SharedBackend::Mock => Some(Arc::new(MockIndex::new())),
            SharedBackend::Remote { .. } => None,
        };

        Ok(Self {
            config,
            http,
            mock,
            provider,
            embedding_wait,
            counts,
        })
    }

    // The only place a filter is built. Tenant scoping starts here and every
    // read/delete below goes through it.
    fn tenant_filter(tenant_id: &str) -> HashMap<String, String> {
        HashMap::from([(TENANT_KEY.to_string(), tenant_id.to_string())])
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

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    async fn raw_search(
        &self,
        query: &[f32],
        k: usize,
        filter: HashMap<String, String>,
    ) -> Result<Vec<WireSearchHit>, VectorStoreError> {
        match &self.config.backend {
            SharedBackend::Mock => Ok(self
                .mock
                .as_ref()
                .expect("mock backend always has an index")
                .search(query, k, &filter)
                .await),
            SharedBackend::Remote { api_url } => {
                let url = format!("{}/search", api_url);
                let body = SearchRequest { vector: query, k, filter };
                let response = self.authorized(self.http.post(&url)).json(&body).send().await?;
                if !response.status().is_success() {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    error!(%status, "shared index search failed");
                    return Err(VectorStoreError::Backend(format!(
                        "search failed ({}): {}",
                        status, text
                    )));
                }
                Ok(response.json().await?)
            }
        }
    }

    fn to_document(hit: WireSearchHit) -> (RetrievedDocument, f32) {
        let similarity = (similarity_from_distance(hit.distance) * 100.0).round() / 100.0;
        (
            RetrievedDocument {
                content: hit.text,
                similarity,
                metadata: hit.metadata,
            },
            hit.distance,
        )
    }
}

#[async_trait]
impl VectorStore for SharedIndexStore {
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

        let mut ids = Vec::with_capacity(chunks.len());
        let batch: Vec<WireRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                let id = Uuid::new_v4().to_string();
                ids.push(id.clone());
                let mut metadata = chunk.metadata.clone();
                // Every write carries the tenant tag; reads depend on it.
                metadata.insert(TENANT_KEY.to_string(), tenant_id.to_string());
                metadata.insert(DOCUMENT_KEY.to_string(), chunk.document_id.clone());
                metadata.insert("chunk_index".to_string(), chunk.chunk_index.to_string());
                WireRecord {
                    id,
                    vector,
                    text: chunk.text.clone(),
                    metadata,
                }
            })
            .collect();

        match &self.config.backend {
            SharedBackend::Mock => {
                self.mock
                    .as_ref()
                    .expect("mock backend always has an index")
                    .insert_batch(batch)
                    .await;
            }
            SharedBackend::Remote { api_url } => {
                let url = format!("{}/vectors/batch", api_url);
                let response = self.authorized(self.http.post(&url)).json(&batch).send().await?;
                if !response.status().is_success() {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    return Err(VectorStoreError::Backend(format!(
                        "batch insert failed ({}): {}",
                        status, text
                    )));
                }
            }
        }
        debug!(tenant = %tenant_id, added = ids.len(), "indexed chunks in shared index");
        Ok(ids)
    }

    async fn delete_documents(
        &self,
        tenant_id: &str,
        document_id: &str,
    ) -> Result<(), VectorStoreError> {
        let mut filter = Self::tenant_filter(tenant_id);
        filter.insert(DOCUMENT_KEY.to_string(), document_id.to_string());

        match &self.config.backend {
            SharedBackend::Mock => {
                let removed = self
                    .mock
                    .as_ref()
                    .expect("mock backend always has an index")
                    .delete_where(&filter)
                    .await;
                debug!(tenant = %tenant_id, document = %document_id, removed, "deleted from shared index");
                Ok(())
            }
            SharedBackend::Remote { api_url } => {
                let url = format!("{}/vectors/delete", api_url);
                let body = DeleteRequest { filter };
                let response = self
                    .authorized(self.http.post(&url))
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| {
                        error!(tenant = %tenant_id, document = %document_id, error = %e, "vector delete failed");
                        VectorStoreError::from(e)
                    })?;
                if !response.status().is_success() {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    error!(tenant = %tenant_id, document = %document_id, %status, "vector delete rejected");
                    return Err(VectorStoreError::Backend(format!(
                        "delete failed ({}): {}",
                        status, text
                    )));
                }
                Ok(())
            }
        }
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

        let hits = self
            .raw_search(&query_vector, k, Self::tenant_filter(tenant_id))
            .await?;
        Ok(hits.into_iter().map(Self::to_document).collect())
    }

    async fn count(&self, tenant_id: &str) -> Result<usize, VectorStoreError> {
        // No native tenant-scoped count on a shared index: probe with a
        // bounded top-k query and fall back to the authoritative count when
        // the probe saturates.
        let cap = self.config.count_probe_limit;
        let probe = self.embed(&[String::new()]).await?;
        let hits = self
            .raw_search(&probe[0], cap, Self::tenant_filter(tenant_id))
            .await?;

        if hits.len() < cap {
            return Ok(hits.len());
        }

        match &self.counts {
            Some(counts) => {
                let authoritative = counts.total_chunk_count(tenant_id).await?;
                Ok(cap.max(authoritative))
            }
            None => {
                warn!(tenant = %tenant_id, cap, "count probe saturated with no authoritative source");
                Ok(cap)
            }
        }
    }
}
