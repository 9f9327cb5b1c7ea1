// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::provider::EmbeddingModel;

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub model_name: String,
    pub dimension: usize,
    pub normalize: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_name: "local-hash-embedder".to_string(),
            dimension: 384,
            normalize: true,
        }
    }
}

/// Deterministic in-process embedding model.
///
/// Derives a fixed-dimension vector from a SHA-256 digest of the text, so
/// the same text always embeds identically and different texts diverge.
/// Stands in for a real sentence-transformer behind the same trait.
pub struct LocalEmbeddingModel {
    config: EmbeddingConfig,
}

impl LocalEmbeddingModel {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        if config.dimension == 0 {
            return Err(anyhow!("embedding dimension must be greater than 0"));
        }
        Ok(Self { config })
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());

        // Stretch the digest with an LCG so dimensions beyond 32 stay
        // decorrelated instead of repeating the hash bytes.
        let mut seed = u64::from_le_bytes(digest[..8].try_into().unwrap());
        let mut vector = Vec::with_capacity(self.config.dimension);
        for i in 0..self.config.dimension {
            seed = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407)
                ^ digest[i % digest.len()] as u64;
            let value = (seed as f64 / u64::MAX as f64) * 2.0 - 1.0;
            vector.push(value as f32);
        }

        if self.config.normalize {
            let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for value in &mut vector {
                    *value /= norm;
                }
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingModel for LocalEmbeddingModel {
    fn model_name(&self) -> &str {
        &self.config.model_name
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
