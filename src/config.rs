// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
//! Runtime configuration
//!
//! Everything is env-overridable with sane defaults. Backend selection is a
//! deployment-time choice, never a per-call parameter.

use std::path::PathBuf;
use std::time::Duration;

use crate::embeddings::EmbeddingConfig;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Retrieval and fallback tuning for the RAG pipeline.
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// How many chunks to retrieve per question.
    pub retrieval_k: usize,
    /// Whether low-similarity results fall back to a direct answer.
    pub fallback_enabled: bool,
    /// Minimum max-similarity to stay in grounded mode.
    pub similarity_threshold: f32,
    /// Bounded wait for the embedding model before a retrieval operation.
    pub embedding_wait: Duration,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            retrieval_k: 4,
            fallback_enabled: true,
            similarity_threshold: 0.5,
            embedding_wait: Duration::from_secs(300),
        }
    }
}

impl RagConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            retrieval_k: env_parse("RAG_RETRIEVAL_K", defaults.retrieval_k),
            fallback_enabled: env_parse("RAG_FALLBACK_ENABLED", defaults.fallback_enabled),
            similarity_threshold: env_parse(
                "RAG_SIMILARITY_THRESHOLD",
                defaults.similarity_threshold,
            ),
            embedding_wait: Duration::from_secs(env_parse(
                "EMBEDDING_WAIT_SECS",
                defaults.embedding_wait.as_secs(),
            )),
        }
    }
}

/// Which vector storage variant this deployment runs.
#[derive(Debug, Clone)]
pub enum VectorBackendConfig {
    /// One physical collection per tenant under `data_dir`.
    Isolated { data_dir: PathBuf },
    /// One shared index for all tenants behind a remote service; reads and
    /// deletes are always tenant-filtered by the store itself.
    Shared {
        api_url: String,
        api_key: Option<String>,
        timeout: Duration,
        /// Top-k cap for the count probe; saturation falls back to the
        /// authoritative chunk-count collaborator.
        count_probe_limit: usize,
    },
}

impl Default for VectorBackendConfig {
    fn default() -> Self {
        VectorBackendConfig::Isolated {
            data_dir: PathBuf::from("./vector_data"),
        }
    }
}

impl VectorBackendConfig {
    /// Read the backend choice from the environment.
    ///
    /// `VECTOR_BACKEND=shared` selects the shared index and requires
    /// `VECTOR_DB_URL`; absence is reported later as a configuration error
    /// by the store constructor (fail fast, no silent degrade).
    pub fn from_env() -> Self {
        match std::env::var("VECTOR_BACKEND").as_deref() {
            Ok("shared") => VectorBackendConfig::Shared {
                api_url: std::env::var("VECTOR_DB_URL").unwrap_or_default(),
                api_key: std::env::var("VECTOR_DB_API_KEY").ok(),
                timeout: Duration::from_millis(env_parse("VECTOR_DB_TIMEOUT_MS", 5000u64)),
                count_probe_limit: env_parse("VECTOR_COUNT_PROBE_LIMIT", 1000usize),
            },
            _ => VectorBackendConfig::Isolated {
                data_dir: PathBuf::from(
                    std::env::var("VECTOR_DATA_DIR")
                        .unwrap_or_else(|_| "./vector_data".to_string()),
                ),
            },
        }
    }
}

/// Top-level configuration for the engine.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub rag: RagConfig,
    pub backend: VectorBackendConfig,
    pub embedding: EmbeddingConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let embedding_defaults = EmbeddingConfig::default();
        Self {
            rag: RagConfig::from_env(),
            backend: VectorBackendConfig::from_env(),
            embedding: EmbeddingConfig {
                model_name: std::env::var("EMBEDDING_MODEL")
                    .unwrap_or(embedding_defaults.model_name),
                dimension: env_parse("EMBEDDING_DIMENSION", embedding_defaults.dimension),
                normalize: env_parse("EMBEDDING_NORMALIZE", embedding_defaults.normalize),
            },
        }
    }
}
