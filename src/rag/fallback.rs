// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
//! Grounded-vs-fallback routing
//!
//! Decides, from raw retrieval distances, whether a query is answered from
//! retrieved context or falls back to the model's general knowledge.

use tracing::info;

/// Policy inputs. `threshold` compares against the best derived similarity.
#[derive(Debug, Clone, Copy)]
pub struct FallbackPolicy {
    pub enabled: bool,
    pub similarity_threshold: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackDecision {
    /// Answer from retrieved context.
    Grounded,
    /// Answer from general knowledge; `reason` is surfaced to the caller.
    Fallback { reason: String },
}

impl FallbackDecision {
    pub fn is_fallback(&self) -> bool {
        matches!(self, FallbackDecision::Fallback { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            FallbackDecision::Grounded => None,
            FallbackDecision::Fallback { reason } => Some(reason),
        }
    }
}

impl FallbackPolicy {
    /// Route a query given the raw distances of its retrieval results.
    ///
    /// An empty result set always falls back; there is nothing to ground
    /// an answer on, so `enabled` only gates the similarity check below.
    /// Similarity is derived per result as `max(0, 1 - distance)` and the
    /// best one is compared against the threshold. The best-vs-threshold
    /// comparison is strict: exactly at the threshold stays grounded.
    pub fn decide(&self, raw_distances: &[f32]) -> FallbackDecision {
        if raw_distances.is_empty() {
            info!("no documents retrieved, answering from general knowledge");
            return FallbackDecision::Fallback {
                reason: "no relevant documents".to_string(),
            };
        }

        if !self.enabled {
            return FallbackDecision::Grounded;
        }

        let max_similarity = raw_distances
            .iter()
            .map(|d| crate::vector::similarity_from_distance(*d))
            .fold(0.0_f32, f32::max);

        if max_similarity < self.similarity_threshold {
            info!(
                max_similarity,
                threshold = self.similarity_threshold,
                "best match below threshold, answering from general knowledge"
            );
            FallbackDecision::Fallback {
                reason: format!(
                    "similarity below threshold ({:.2} < {:.2})",
                    max_similarity, self.similarity_threshold
                ),
            }
        } else {
            FallbackDecision::Grounded
        }
    }
}
