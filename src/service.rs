//! Recap service: the entry point callers use.
//!
//! [`RecapService::process`] runs a [`Task`] through the chunked pipeline.
//! The remaining operations are single calls that share the same retry and
//! classification discipline but never chunk their input; they truncate it
//! to a fixed excerpt instead.

use crate::config::RecapConfig;
use crate::error::ClassifiedError;
use crate::llm::{create_llm_provider, CompletionRequest, LlmError, LlmProvider};
use crate::pipeline::{Pipeline, PipelineConfig, PipelineOutput, Stage};
use crate::run_log::{RunLog, RunLogStore, RunLogsRetentionConfig};
use crate::task::{prompts, Task, REPLY_MAX_TOKENS};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// Transcript excerpt used to name a recording
pub const NAME_EXCERPT_CHARS: usize = 2_000;
/// Longest generated recording name
pub const NAME_MAX_CHARS: usize = 30;
pub const NAME_MAX_TOKENS: u32 = 60;
/// Transcript excerpt used for meeting insights
pub const ANALYZE_EXCERPT_CHARS: usize = 4_000;
pub const ANALYZE_MAX_TOKENS: u32 = 400;
/// Rough processing time per chunk, reported by [`RecapService::stats`]
pub const SECONDS_PER_CHUNK: usize = 10;

/// Kind of artifact handed to an [`ArtifactSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Summary,
    Email,
    Name,
}

/// Persistence hook for finished artifacts.
///
/// Called only after a run succeeded and only when the run carries a
/// recording id. A failing sink does not fail the run.
pub trait ArtifactSink: Send + Sync {
    fn store(&self, recording_id: &str, kind: ArtifactKind, content: &str) -> Result<(), String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub recording_id: String,
    pub kind: ArtifactKind,
    pub content: String,
}

/// In-memory sink, mostly useful in tests and tools.
#[derive(Debug, Default)]
pub struct MemoryArtifactSink {
    artifacts: Mutex<Vec<StoredArtifact>>,
}

impl MemoryArtifactSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artifacts(&self) -> Vec<StoredArtifact> {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ArtifactSink for MemoryArtifactSink {
    fn store(&self, recording_id: &str, kind: ArtifactKind, content: &str) -> Result<(), String> {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StoredArtifact {
                recording_id: recording_id.to_string(),
                kind,
                content: content.to_string(),
            });
        Ok(())
    }
}

/// Per-run context supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    /// Recording the artifact belongs to; nothing is persisted without it
    pub recording_id: Option<String>,
}

impl RunContext {
    pub fn for_recording(recording_id: impl Into<String>) -> Self {
        Self {
            recording_id: Some(recording_id.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStyle {
    /// Same email, fewer words
    Shorter,
    /// A different email with a different angle
    Rewrite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightAlert {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// Quick classification of a meeting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeetingInsights {
    pub meeting_type: String,
    pub email_default: String,
    /// Suggested follow-up questions
    pub pills: Vec<String>,
    pub alerts: Vec<InsightAlert>,
}

impl Default for MeetingInsights {
    fn default() -> Self {
        Self {
            meeting_type: "sales".to_string(),
            email_default: "customer".to_string(),
            pills: vec![
                "What are the key next steps?".to_string(),
                "Any risks to flag?".to_string(),
                "Who owns what?".to_string(),
            ],
            alerts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptStats {
    pub chars: usize,
    pub estimated_tokens: usize,
    pub chunks: usize,
    pub estimated_seconds: usize,
}

fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

pub struct RecapService {
    pipeline: Pipeline,
    logs: RunLogStore,
    sink: Option<Arc<dyn ArtifactSink>>,
}

impl RecapService {
    pub fn new(provider: Arc<dyn LlmProvider>, config: PipelineConfig) -> Self {
        Self {
            pipeline: Pipeline::new(provider, config),
            logs: RunLogStore::new(),
            sink: None,
        }
    }

    /// Build the provider and pipeline described by `config`.
    pub fn from_config(config: &RecapConfig) -> Result<Self, LlmError> {
        let provider = create_llm_provider(&config.llm)?;
        log::info!(
            "Service: using {} ({})",
            provider.name(),
            provider.model()
        );
        Ok(Self::new(provider, config.pipeline.clone()))
    }

    /// Keep run logs according to `retention` instead of the default
    /// last-50 policy.
    pub fn with_log_retention(self, retention: RunLogsRetentionConfig) -> Self {
        self.logs.set_retention(retention);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Recent run logs
    pub fn logs(&self) -> &RunLogStore {
        &self.logs
    }

    /// Run `task` over `transcript` and return the final artifact.
    pub async fn process(
        &self,
        transcript: &str,
        task: &Task,
        ctx: &RunContext,
    ) -> Result<PipelineOutput, ClassifiedError> {
        let mut log = RunLog::new(task.label());
        log.recording_id = ctx.recording_id.clone();

        if let Err(reason) = task.validate() {
            let error = ClassifiedError::invalid_input(reason);
            log::warn!("Service: rejected {} request: {}", task.label(), error.detail);
            log.complete_error(&error);
            self.logs.record(log);
            return Err(error);
        }

        let result = self.pipeline.run_logged(transcript, task, &mut log).await;
        self.logs.record(log.clone());
        let text = result?;

        let kind = match task {
            Task::Summarize => Some(ArtifactKind::Summary),
            Task::DraftEmail(_) => Some(ArtifactKind::Email),
            Task::Answer(_) => None,
        };
        if let Some(kind) = kind {
            self.persist(ctx, kind, &text);
        }

        Ok(PipelineOutput {
            text,
            chunk_count: log.chunk_count,
            log,
        })
    }

    /// Suggest a short name for a recording from the start of its transcript.
    pub async fn generate_name(
        &self,
        transcript: &str,
        ctx: &RunContext,
    ) -> Result<String, ClassifiedError> {
        let text = excerpt(transcript, NAME_EXCERPT_CHARS);
        if text.trim().is_empty() {
            return Err(ClassifiedError::invalid_input("Transcript required"));
        }

        let request = CompletionRequest::prompt(
            prompts::section(prompts::NAME_PROMPT, "Transcript", text),
            NAME_MAX_TOKENS,
        );
        let raw = self.single_call("generate_name", request, ctx).await?;
        let name: String = raw.trim().chars().take(NAME_MAX_CHARS).collect();

        self.persist(ctx, ArtifactKind::Name, &name);
        Ok(name)
    }

    /// Classify the meeting from the start of its transcript.
    ///
    /// Never fails: an empty transcript, a failed call or an unparseable reply
    /// all yield [`MeetingInsights::default`].
    pub async fn analyze(&self, transcript: &str) -> MeetingInsights {
        let text = excerpt(transcript, ANALYZE_EXCERPT_CHARS);
        if text.is_empty() {
            return MeetingInsights::default();
        }

        let request = CompletionRequest::prompt(
            prompts::section(prompts::ANALYZE_PROMPT, "Transcript", text),
            ANALYZE_MAX_TOKENS,
        );
        let reply = match self
            .single_call("analyze", request, &RunContext::default())
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("Service: analyze failed, using defaults: {}", e.detail);
                return MeetingInsights::default();
            }
        };

        match serde_json::from_str::<MeetingInsights>(reply.trim()) {
            Ok(insights) => insights,
            Err(e) => {
                log::warn!("Service: analyze reply is not valid JSON, using defaults: {}", e);
                MeetingInsights::default()
            }
        }
    }

    /// Produce a new version of an email.
    pub async fn regenerate_email(
        &self,
        current_email: &str,
        style: EmailStyle,
        summary: Option<&str>,
        ctx: &RunContext,
    ) -> Result<String, ClassifiedError> {
        if current_email.trim().is_empty() {
            return Err(ClassifiedError::invalid_input("Current email required"));
        }

        let prompt = match style {
            EmailStyle::Shorter => {
                prompts::section(prompts::SHORTER_EMAIL_PROMPT, "Current email", current_email)
            }
            EmailStyle::Rewrite => prompts::section(
                &prompts::section(
                    prompts::REWRITE_EMAIL_PROMPT,
                    "Meeting summary",
                    summary
                        .filter(|s| !s.trim().is_empty())
                        .unwrap_or(prompts::NO_SUMMARY),
                ),
                "Current email (write something different)",
                current_email,
            ),
        };

        let email = self
            .single_call(
                "regenerate_email",
                CompletionRequest::prompt(prompt, REPLY_MAX_TOKENS),
                ctx,
            )
            .await?;
        self.persist(ctx, ArtifactKind::Email, &email);
        Ok(email)
    }

    /// Apply a free-form edit instruction to an email.
    pub async fn quick_edit_email(
        &self,
        current_email: &str,
        instruction: &str,
        ctx: &RunContext,
    ) -> Result<String, ClassifiedError> {
        if current_email.trim().is_empty() || instruction.trim().is_empty() {
            return Err(ClassifiedError::invalid_input("Email and instruction required"));
        }

        let prompt = prompts::section(
            &prompts::section(prompts::QUICK_EDIT_PROMPT, "Edit instruction", instruction),
            "Current email",
            current_email,
        );
        let email = self
            .single_call(
                "quick_edit_email",
                CompletionRequest::prompt(prompt, REPLY_MAX_TOKENS),
                ctx,
            )
            .await?;
        self.persist(ctx, ArtifactKind::Email, &email);
        Ok(email)
    }

    /// Size estimates for a transcript. Makes no calls.
    pub fn stats(&self, transcript: &str) -> TranscriptStats {
        let chars = transcript.chars().count();
        let chunks = self.pipeline.segmenter().count_chunks(transcript);
        TranscriptStats {
            chars,
            estimated_tokens: chars / 4,
            chunks,
            estimated_seconds: chunks * SECONDS_PER_CHUNK,
        }
    }

    async fn single_call(
        &self,
        name: &str,
        request: CompletionRequest,
        ctx: &RunContext,
    ) -> Result<String, ClassifiedError> {
        let mut log = RunLog::new(name);
        log.recording_id = ctx.recording_id.clone();
        log.provider = Some(self.pipeline.provider().name().to_string());
        log.model = Some(self.pipeline.provider().model().to_string());

        let stage = Stage::Operation {
            name: name.to_string(),
        };
        let result = self.pipeline.call(request, stage, &mut log).await;
        match &result {
            Ok(_) => log.complete_success(),
            Err(e) => log.complete_error(e),
        }
        self.logs.record(log);
        result
    }

    fn persist(&self, ctx: &RunContext, kind: ArtifactKind, content: &str) {
        let (Some(sink), Some(recording_id)) = (&self.sink, ctx.recording_id.as_deref()) else {
            return;
        };
        if let Err(e) = sink.store(recording_id, kind, content) {
            log::warn!(
                "Service: failed to store {:?} for recording {}: {}",
                kind,
                recording_id,
                e
            );
        }
    }
}
