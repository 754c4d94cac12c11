//! Chunked orchestration pipeline: segment → map → merge.
//!
//! A transcript that fits the chunk budget is answered by a single call. A
//! longer one is split into word-aligned chunks, each chunk is sent through
//! the retry invoker in chunk order (map), and the ordered partial results are
//! combined by one more call (merge).
//!
//! Every call, whatever the stage, goes through the same [`with_retry`]
//! discipline. Any stage failure ends the run with one [`ClassifiedError`];
//! partial artifacts are never returned.

use crate::error::{translate, ClassifiedError};
use crate::llm::{CompletionRequest, LlmProvider};
use crate::retry::{with_retry, RetryConfig};
use crate::run_log::{CallRecord, RunLog};
use crate::segment::{Chunk, Segmenter, DEFAULT_MAX_CHARS_PER_CHUNK};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Default number of chunk calls in flight during the map stage
pub const DEFAULT_MAP_CONCURRENCY: usize = 1;

/// Separator between tagged partials in the merge request
pub const PART_SEPARATOR: &str = "\n---\n";

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Per-chunk character budget
    pub max_chars_per_chunk: usize,
    /// Retry discipline applied to every call
    pub retry: RetryConfig,
    /// Chunk calls allowed in flight at once; 1 keeps the map stage sequential
    pub map_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_chars_per_chunk: DEFAULT_MAX_CHARS_PER_CHUNK,
            retry: RetryConfig::default(),
            map_concurrency: DEFAULT_MAP_CONCURRENCY,
        }
    }
}

/// Which call of a run a request belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stage {
    /// The whole transcript fit in one chunk
    Single,
    /// Per-chunk call; `index` is 0-based
    Map { index: usize, total: usize },
    /// Combination of `parts` partials
    Merge { parts: usize },
    /// Standalone call outside the chunked flow
    Operation { name: String },
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Single => write!(f, "single call"),
            Stage::Map { index, total } => write!(f, "chunk {}/{}", index + 1, total),
            Stage::Merge { parts } => write!(f, "merge of {} parts", parts),
            Stage::Operation { name } => write!(f, "{}", name),
        }
    }
}

/// Builds the task-specific requests for each stage.
///
/// The pipeline treats the requests as opaque.
pub trait RequestFactory: Send + Sync {
    /// Short label used in logs, e.g. `summarize`
    fn label(&self) -> &str;

    /// Request for a transcript that fit in a single chunk
    fn single_request(&self, transcript: &str) -> CompletionRequest;

    /// Request for one chunk of a longer transcript
    fn chunk_request(&self, chunk: &Chunk, total: usize) -> CompletionRequest;

    /// Request combining the tagged partials produced by [`merge_partials`]
    fn merge_request(&self, merged_partials: &str, parts: usize) -> CompletionRequest;
}

/// Output of the map stage for exactly one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialArtifact {
    /// Index of the source chunk
    pub index: usize,
    pub text: String,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// The final artifact
    pub text: String,
    pub chunk_count: usize,
    pub log: RunLog,
}

/// Join partials in order, each tagged with its 1-based position.
pub fn merge_partials(partials: &[PartialArtifact]) -> String {
    let total = partials.len();
    partials
        .iter()
        .enumerate()
        .map(|(i, p)| format!("Part {} of {}:\n{}", i + 1, total, p.text))
        .collect::<Vec<_>>()
        .join(PART_SEPARATOR)
}

pub struct Pipeline {
    provider: Arc<dyn LlmProvider>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(provider: Arc<dyn LlmProvider>, config: PipelineConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn segmenter(&self) -> Segmenter {
        Segmenter::new(self.config.max_chars_per_chunk)
    }

    /// Run the whole pipeline with a fresh run log.
    pub async fn run(
        &self,
        transcript: &str,
        factory: &dyn RequestFactory,
    ) -> Result<PipelineOutput, ClassifiedError> {
        let mut log = RunLog::new(factory.label());
        let text = self.run_logged(transcript, factory, &mut log).await?;
        Ok(PipelineOutput {
            text,
            chunk_count: log.chunk_count,
            log,
        })
    }

    /// Run the whole pipeline, recording into `log`. The log is completed
    /// either way.
    pub async fn run_logged(
        &self,
        transcript: &str,
        factory: &dyn RequestFactory,
        log: &mut RunLog,
    ) -> Result<String, ClassifiedError> {
        log.provider = Some(self.provider.name().to_string());
        log.model = Some(self.provider.model().to_string());

        let result = self.execute(transcript, factory, log).await;
        match &result {
            Ok(_) => log.complete_success(),
            Err(e) => log.complete_error(e),
        }
        result
    }

    async fn execute(
        &self,
        transcript: &str,
        factory: &dyn RequestFactory,
        log: &mut RunLog,
    ) -> Result<String, ClassifiedError> {
        let chunks = self.segmenter().segment(transcript);
        log.transcript_chars = transcript.chars().count();
        log.chunk_count = chunks.len();

        log::info!(
            "Pipeline: {} over {} chars in {} chunk(s)",
            factory.label(),
            log.transcript_chars,
            chunks.len()
        );
        log.info(format!("Segmented into {} chunk(s)", chunks.len()));

        if let [only] = chunks.as_slice() {
            let request = factory.single_request(&only.text);
            return self.call(request, Stage::Single, log).await;
        }

        let partials = self.map_stage(&chunks, factory, log).await?;
        self.merge_stage(partials, factory, log).await
    }

    /// Invoke the per-chunk request for every chunk, in chunk order.
    ///
    /// The first failing chunk ends the stage; with a concurrency above one,
    /// calls still in flight are dropped.
    pub async fn map_stage(
        &self,
        chunks: &[Chunk],
        factory: &dyn RequestFactory,
        log: &mut RunLog,
    ) -> Result<Vec<PartialArtifact>, ClassifiedError> {
        let total = chunks.len();
        let concurrency = self.config.map_concurrency.max(1);

        let mut calls = stream::iter(chunks)
            .map(|chunk| {
                let request = factory.chunk_request(chunk, total);
                async move {
                    let started = Instant::now();
                    let result =
                        with_retry(&self.config.retry, || self.provider.complete(&request)).await;
                    (chunk.index, result, started.elapsed().as_millis() as u64)
                }
            })
            .buffered(concurrency);

        let mut partials = Vec::with_capacity(total);
        while let Some((index, result, duration_ms)) = calls.next().await {
            let stage = Stage::Map { index, total };
            match result {
                Ok(invocation) => {
                    log::debug!("Pipeline: {} done ({} attempt(s))", stage, invocation.attempts.len());
                    log.record_call(CallRecord {
                        stage,
                        attempts: invocation.attempts,
                        duration_ms,
                        succeeded: true,
                    });
                    partials.push(PartialArtifact {
                        index,
                        text: invocation.value,
                    });
                }
                Err(failure) => {
                    let error = translate(&failure, stage.clone());
                    log.record_call(CallRecord {
                        stage,
                        attempts: failure.attempts,
                        duration_ms,
                        succeeded: false,
                    });
                    return Err(error);
                }
            }
        }

        Ok(partials)
    }

    /// Combine ordered partials into the final artifact.
    ///
    /// A single partial is already final and is returned without a call.
    pub async fn merge_stage(
        &self,
        partials: Vec<PartialArtifact>,
        factory: &dyn RequestFactory,
        log: &mut RunLog,
    ) -> Result<String, ClassifiedError> {
        if let [only] = partials.as_slice() {
            return Ok(only.text.clone());
        }

        let parts = partials.len();

        let merged = merge_partials(&partials);
        log.info(format!("Merging {} partials", parts));
        let request = factory.merge_request(&merged, parts);
        self.call(request, Stage::Merge { parts }, log).await
    }

    /// One call through the retry invoker, recorded under `stage`.
    pub async fn call(
        &self,
        request: CompletionRequest,
        stage: Stage,
        log: &mut RunLog,
    ) -> Result<String, ClassifiedError> {
        let started = Instant::now();
        let result = with_retry(&self.config.retry, || self.provider.complete(&request)).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(invocation) => {
                log::debug!("Pipeline: {} done ({} attempt(s))", stage, invocation.attempts.len());
                log.record_call(CallRecord {
                    stage,
                    attempts: invocation.attempts,
                    duration_ms,
                    succeeded: true,
                });
                Ok(invocation.value)
            }
            Err(failure) => {
                let error = translate(&failure, stage.clone());
                log.record_call(CallRecord {
                    stage,
                    attempts: failure.attempts,
                    duration_ms,
                    succeeded: false,
                });
                Err(error)
            }
        }
    }
}
