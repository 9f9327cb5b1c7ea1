// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
//! Retrieval-augmented answering
//!
//! The pipeline retrieves tenant-scoped context, routes between grounded
//! and general-knowledge answering, and generates the answer either as one
//! result or as a stream of events.

pub mod error;
pub mod fallback;
pub mod pipeline;
pub mod prompts;

pub use error::RagError;
pub use fallback::{FallbackDecision, FallbackPolicy};
pub use pipeline::{EventStream, PipelineEvent, QueryResult, RagPipeline, ThinkingStep};

pub use crate::vector::RetrievedDocument;
