// Copyright (c) 2025 Ragstream Contributors
// SPDX-License-Identifier: BUSL-1.1
//! Query orchestration
//!
//! [`RagPipeline`] runs one question through retrieve, route, generate.
//! [`RagPipeline::query`] and [`RagPipeline::query_stream`] share the same
//! preparation path; the only difference is how the answer leaves the
//! pipeline (one result vs. an event stream).

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use super::error::RagError;
use super::fallback::{FallbackDecision, FallbackPolicy};
use super::prompts;
use crate::config::RagConfig;
use crate::llm::LlmClient;
use crate::vector::{RetrievedDocument, VectorStore};

/// One entry in the visible reasoning trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingStep {
    pub step: usize,
    pub action: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ThinkingStep {
    fn new(step: usize, action: &str, description: impl Into<String>) -> Self {
        Self {
            step,
            action: action.to_string(),
            description: description.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Final outcome of one query, identical for both entry points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    pub retrieved_docs: Vec<RetrievedDocument>,
    pub thinking_process: Vec<ThinkingStep>,
    pub elapsed_secs: f64,
    pub tokens_used: usize,
    pub fallback_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

/// Events emitted by [`RagPipeline::query_stream`], in order: one
/// `Thinking`, zero or more `Chunk`s, one terminal `Complete`. A stream
/// error replaces the terminal event; nothing follows it.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Thinking { steps: Vec<ThinkingStep> },
    Chunk { content: String },
    Complete { result: QueryResult },
}

pub type EventStream = ReceiverStream<Result<PipelineEvent, RagError>>;

// Everything shared between the blocking and streaming paths.
struct Prepared {
    prompt: String,
    context_len: usize,
    docs: Vec<RetrievedDocument>,
    steps: Vec<ThinkingStep>,
    fallback_mode: bool,
    fallback_reason: Option<String>,
}

#[derive(Clone)]
pub struct RagPipeline {
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn LlmClient>,
    config: RagConfig,
}

impl RagPipeline {
    pub fn new(store: Arc<dyn VectorStore>, llm: Arc<dyn LlmClient>, config: RagConfig) -> Self {
        Self { store, llm, config }
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    fn policy(&self) -> FallbackPolicy {
        FallbackPolicy {
            enabled: self.config.fallback_enabled,
            similarity_threshold: self.config.similarity_threshold,
        }
    }

    // Retrieve, route, and build the prompt. Shared by query and
    // query_stream so the two paths cannot drift apart.
    async fn prepare(&self, tenant_id: &str, question: &str) -> Result<Prepared, RagError> {
        let mut steps = vec![ThinkingStep::new(1, "analyzing", "Analyzing the question")
            .with_details(format!("{} characters", question.len()))];

        let scored = self
            .store
            .search_with_score(tenant_id, question, self.config.retrieval_k)
            .await?;
        let raw_distances: Vec<f32> = scored.iter().map(|(_, d)| *d).collect();
        let docs: Vec<RetrievedDocument> = scored.into_iter().map(|(doc, _)| doc).collect();

        let retrieval_details = if docs.is_empty() {
            format!("0 of up to {} chunks", self.config.retrieval_k)
        } else {
            let avg_similarity = docs.iter().map(|d| d.similarity).sum::<f32>() / docs.len() as f32;
            format!(
                "{} of up to {} chunks, average similarity {:.2}",
                docs.len(),
                self.config.retrieval_k,
                avg_similarity
            )
        };
        steps.push(
            ThinkingStep::new(2, "retrieving", "Searching the document index")
                .with_details(retrieval_details),
        );

        let decision = self.policy().decide(&raw_distances);
        let prepared = match decision {
            FallbackDecision::Grounded => {
                let context = prompts::build_context(&docs);
                steps.push(
                    ThinkingStep::new(3, "grounded", "Answering from retrieved documents")
                        .with_details(format!("{} context characters", context.len())),
                );
                Prepared {
                    prompt: prompts::grounded_prompt(&context, question),
                    context_len: context.len(),
                    docs,
                    steps,
                    fallback_mode: false,
                    fallback_reason: None,
                }
            }
            FallbackDecision::Fallback { reason } => {
                steps.push(
                    ThinkingStep::new(3, "fallback", "Answering from general knowledge")
                        .with_details(reason.clone()),
                );
                Prepared {
                    prompt: prompts::direct_prompt(question),
                    context_len: 0,
                    // Nothing grounded the answer, so nothing is reported
                    // or persisted as a source.
                    docs: Vec::new(),
                    steps,
                    fallback_mode: true,
                    fallback_reason: Some(reason),
                }
            }
        };
        Ok(prepared)
    }

    // Rough size accounting, close enough for display and quotas.
    fn estimate_tokens(context_len: usize, question: &str, answer: &str) -> usize {
        (context_len + question.len() + answer.len()) / 4
    }

    fn finish(
        mut prepared: Prepared,
        question: &str,
        answer: String,
        started: Instant,
    ) -> QueryResult {
        prepared
            .steps
            .push(ThinkingStep::new(4, "generating", "Generated the answer").with_details(
                format!("{} characters", answer.len()),
            ));
        let tokens_used = Self::estimate_tokens(prepared.context_len, question, &answer);
        QueryResult {
            answer,
            retrieved_docs: prepared.docs,
            thinking_process: prepared.steps,
            elapsed_secs: started.elapsed().as_secs_f64(),
            tokens_used,
            fallback_mode: prepared.fallback_mode,
            fallback_reason: prepared.fallback_reason,
        }
    }

    /// Answer one question, returning the complete result at once.
    pub async fn query(&self, tenant_id: &str, question: &str) -> Result<QueryResult, RagError> {
        let started = Instant::now();
        let prepared = self.prepare(tenant_id, question).await?;
        let answer = self.llm.generate(&prepared.prompt).await?;

        let result = Self::finish(prepared, question, answer, started);
        info!(
            tenant = %tenant_id,
            fallback = result.fallback_mode,
            elapsed_secs = result.elapsed_secs,
            "query completed"
        );
        Ok(result)
    }

    /// Answer one question as an event stream.
    ///
    /// Returns immediately; preparation and generation run in a spawned
    /// task. Any failure arrives as a terminal `Err` item on the stream.
    pub fn query_stream(&self, tenant_id: &str, question: &str) -> EventStream {
        let (tx, rx) = mpsc::channel::<Result<PipelineEvent, RagError>>(64);
        let pipeline = self.clone();
        let tenant_id = tenant_id.to_string();
        let question = question.to_string();

        tokio::spawn(async move {
            pipeline.run_stream(tenant_id, question, tx).await;
        });

        ReceiverStream::new(rx)
    }

    async fn run_stream(
        self,
        tenant_id: String,
        question: String,
        tx: mpsc::Sender<Result<PipelineEvent, RagError>>,
    ) {
        use futures::StreamExt;

        let started = Instant::now();
        let prepared = match self.prepare(&tenant_id, &question).await {
            Ok(prepared) => prepared,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };

        if tx
            .send(Ok(PipelineEvent::Thinking {
                steps: prepared.steps.clone(),
            }))
            .await
            .is_err()
        {
            debug!(tenant = %tenant_id, "stream receiver dropped before thinking event");
            return;
        }

        let mut chunks = match self.llm.generate_stream(&prepared.prompt).await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = tx.send(Err(RagError::from(e))).await;
                return;
            }
        };

        let mut answer = String::new();
        while let Some(item) = chunks.next().await {
            match item {
                Ok(content) => {
                    if content.is_empty() {
                        continue;
                    }
                    answer.push_str(&content);
                    if tx.send(Ok(PipelineEvent::Chunk { content })).await.is_err() {
                        debug!(tenant = %tenant_id, "stream receiver dropped mid-answer");
                        return;
                    }
                }
                Err(e) => {
                    warn!(tenant = %tenant_id, error = %e, "generation stream failed");
                    let _ = tx.send(Err(RagError::from(e))).await;
                    return;
                }
            }
        }

        let result = Self::finish(prepared, &question, answer, started);
        info!(
            tenant = %tenant_id,
            fallback = result.fallback_mode,
            elapsed_secs = result.elapsed_secs,
            "streaming query completed"
        );
        let _ = tx.send(Ok(PipelineEvent::Complete { result })).await;
    }
}
