// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
//! Lazy, once-per-process embedding model loading
//!
//! Loading an embedding model is expensive, so it happens at most once per
//! process on a background task while callers either poll `is_ready` or
//! block on `wait_ready` with a timeout. Concurrent waiters share the same
//! in-flight load. A failed load resets the provider so a later call can
//! trigger another attempt; nothing retries automatically.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// A text-embedding model: equal-length list in, fixed-dimension vectors out.
///
/// Used identically for indexing and query-time embedding.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    fn model_name(&self) -> &str;
    fn dimension(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

type ModelFactory = dyn Fn() -> Result<Arc<dyn EmbeddingModel>> + Send + Sync;

enum LoadState {
    Idle,
    Loading,
    Ready(Arc<dyn EmbeddingModel>),
}

/// Snapshot of the loading state, for status displays.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadStatus {
    pub loaded: bool,
    pub loading: bool,
    pub model_name: String,
}

struct Inner {
    state: Mutex<LoadState>,
    changed: Notify,
    factory: Box<ModelFactory>,
    model_label: String,
}

/// Shared handle to the process-wide embedding model.
#[derive(Clone)]
pub struct EmbeddingProvider {
    inner: Arc<Inner>,
}

impl EmbeddingProvider {
    /// Create a provider around a model factory. The factory runs once, on
    /// a blocking worker thread, the first time loading is triggered.
    pub fn new<F>(model_label: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn EmbeddingModel>> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(LoadState::Idle),
                changed: Notify::new(),
                factory: Box::new(factory),
                model_label: model_label.into(),
            }),
        }
    }

    /// Convenience constructor that wraps an already-built model.
    pub fn preloaded(model: Arc<dyn EmbeddingModel>) -> Self {
        let label = model.model_name().to_string();
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(LoadState::Ready(model)),
                changed: Notify::new(),
                factory: Box::new(|| unreachable!("preloaded provider never loads")),
                model_label: label,
            }),
        }
    }

    /// Trigger loading if it has not started. Idempotent; a no-op while a
    /// load is in flight or after it succeeded. Must run inside a tokio
    /// runtime.
    pub fn start_loading(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            match *state {
                LoadState::Idle => *state = LoadState::Loading,
                LoadState::Loading | LoadState::Ready(_) => return,
            }
        }

        info!(model = %self.inner.model_label, "starting embedding model load");
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let factory_inner = inner.clone();
            let loaded =
                tokio::task::spawn_blocking(move || (factory_inner.factory)()).await;

            let mut state = inner.state.lock().unwrap();
            match loaded {
                Ok(Ok(model)) => {
                    info!(model = %inner.model_label, "embedding model loaded");
                    *state = LoadState::Ready(model);
                }
                Ok(Err(e)) => {
                    error!(model = %inner.model_label, error = %e, "embedding model load failed");
                    *state = LoadState::Idle;
                }
                Err(e) => {
                    error!(model = %inner.model_label, error = %e, "embedding load task panicked");
                    *state = LoadState::Idle;
                }
            }
            drop(state);
            inner.changed.notify_waiters();
        });
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.inner.state.lock().unwrap(), LoadState::Ready(_))
    }

    pub fn status(&self) -> LoadStatus {
        let state = self.inner.state.lock().unwrap();
        LoadStatus {
            loaded: matches!(*state, LoadState::Ready(_)),
            loading: matches!(*state, LoadState::Loading),
            model_name: self.inner.model_label.clone(),
        }
    }

    /// Block until the model is loaded or the timeout elapses.
    ///
    /// Returns whether the model became ready. A load failure observed
    /// while waiting returns false immediately; this call does not retry.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.start_loading();

        loop {
            let notified = self.inner.changed.notified();
            match *self.inner.state.lock().unwrap() {
                LoadState::Ready(_) => return true,
                // Idle after we triggered loading means the load failed.
                LoadState::Idle => return false,
                LoadState::Loading => {}
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(
                    model = %self.inner.model_label,
                    timeout_secs = timeout.as_secs(),
                    "timed out waiting for embedding model"
                );
                return false;
            }
            let _ = tokio::time::timeout(remaining, notified).await;
        }
    }

    /// The loaded model, if ready.
    pub fn model(&self) -> Option<Arc<dyn EmbeddingModel>> {
        match &*self.inner.state.lock().unwrap() {
            LoadState::Ready(model) => Some(model.clone()),
            _ => None,
        }
    }

    /// Wait for readiness and hand out the model, or `None` on timeout or
    /// load failure. Call sites translate `None` into a fatal error for
    /// the operation that needed the embeddings.
    pub async fn ready_model(&self, timeout: Duration) -> Option<Arc<dyn EmbeddingModel>> {
        if !self.wait_ready(timeout).await {
            return None;
        }
        self.model()
    }
}
