// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
pub mod local_model;
pub mod provider;

pub use local_model::{EmbeddingConfig, LocalEmbeddingModel};
pub use provider::{EmbeddingModel, EmbeddingProvider, LoadStatus};
