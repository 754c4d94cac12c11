//! Meeting recap: chunked LLM orchestration over meeting transcripts.
//!
//! A transcript is segmented into word-aligned chunks, each chunk goes through
//! a completion call with classified retries, and the ordered partial results
//! are merged into one artifact. See [`RecapService`] for the entry point.

pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod retry;
pub mod run_log;
pub mod segment;
pub mod service;
pub mod task;

#[cfg(test)]
mod tests;

pub use config::{ConfigError, RecapConfig};
pub use error::{classify, ClassifiedError, ErrorCategory};
pub use llm::{create_llm_provider, CompletionRequest, LlmConfig, LlmError, LlmProvider};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutput, RequestFactory, Stage};
pub use retry::{with_retry, RetryConfig};
pub use run_log::{RunLog, RunLogStore, RunLogsRetentionConfig, RunLogsRetentionMode};
pub use segment::{segment, Chunk, Segmenter};
pub use service::{ArtifactKind, ArtifactSink, RecapService, RunContext};
pub use task::{AnswerParams, EmailKind, EmailParams, Task};

/// Install the global logger. `RUST_LOG` overrides the default `info` filter.
///
/// Safe to call more than once; only the first call takes effect.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
