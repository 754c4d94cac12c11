//! Tasks the pipeline can run over a transcript.
//!
//! Each [`Task`] is a [`RequestFactory`]: it turns a whole transcript, one
//! chunk, or the tagged partials of a long transcript into a
//! [`CompletionRequest`]. The pipeline never looks inside those requests.

pub mod prompts;

use crate::llm::{ChatMessage, CompletionRequest};
use crate::pipeline::RequestFactory;
use crate::segment::Chunk;
use serde::{Deserialize, Serialize};

/// Token limit for a summary produced in one call
pub const SUMMARY_MAX_TOKENS: u32 = 2048;
/// Token limit for the extract of one chunk
pub const CHUNK_MAX_TOKENS: u32 = 1024;
/// Token limit for the merge of a summary
pub const MERGE_MAX_TOKENS: u32 = 2048;
/// Token limit for emails and answers, whatever the stage
pub const REPLY_MAX_TOKENS: u32 = 1024;

/// Kind of email to draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailKind {
    /// Follow-up sent to the customer
    #[default]
    Customer,
    /// Internal recap sent to the team
    TeamUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailParams {
    pub kind: EmailKind,
    /// Summary produced earlier, if any
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerParams {
    pub question: String,
    /// Earlier turns of the conversation, oldest first
    pub history: Vec<ChatMessage>,
    pub summary: Option<String>,
}

/// What to produce from a transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Task {
    Summarize,
    DraftEmail(EmailParams),
    Answer(AnswerParams),
}

impl Task {
    pub fn label(&self) -> &'static str {
        match self {
            Task::Summarize => "summarize",
            Task::DraftEmail(_) => "draft_email",
            Task::Answer(_) => "answer",
        }
    }

    /// Check caller parameters before any call is made.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Task::Answer(params) if params.question.trim().is_empty() => {
                Err("No question provided".to_string())
            }
            _ => Ok(()),
        }
    }

    fn summary_or_placeholder(summary: &Option<String>) -> &str {
        match summary.as_deref() {
            Some(s) if !s.trim().is_empty() => s,
            _ => prompts::NO_SUMMARY,
        }
    }

    fn email_prompt(kind: EmailKind) -> &'static str {
        match kind {
            EmailKind::Customer => prompts::CUSTOMER_EMAIL_PROMPT,
            EmailKind::TeamUpdate => prompts::TEAM_UPDATE_EMAIL_PROMPT,
        }
    }

    fn answer_request(params: &AnswerParams, context_label: &str, context: &str) -> CompletionRequest {
        let system = prompts::section(
            &prompts::section(prompts::ANSWER_SYSTEM_PROMPT, context_label, context),
            "Meeting Summary",
            Self::summary_or_placeholder(&params.summary),
        );

        let mut messages = params.history.clone();
        messages.push(ChatMessage::user(params.question.clone()));

        CompletionRequest {
            system: Some(system),
            messages,
            max_tokens: REPLY_MAX_TOKENS,
        }
    }
}

impl RequestFactory for Task {
    fn label(&self) -> &str {
        Task::label(self)
    }

    fn single_request(&self, transcript: &str) -> CompletionRequest {
        match self {
            Task::Summarize => CompletionRequest::prompt(
                prompts::section(prompts::SUMMARY_PROMPT, "Transcript", transcript),
                SUMMARY_MAX_TOKENS,
            ),
            Task::DraftEmail(params) => {
                let prompt = prompts::section(
                    &prompts::section(
                        Self::email_prompt(params.kind),
                        "Meeting summary",
                        Self::summary_or_placeholder(&params.summary),
                    ),
                    "Meeting transcript",
                    transcript,
                );
                CompletionRequest::prompt(prompt, REPLY_MAX_TOKENS)
            }
            Task::Answer(params) => Self::answer_request(params, "Meeting Transcript", transcript),
        }
    }

    fn chunk_request(&self, chunk: &Chunk, total: usize) -> CompletionRequest {
        let header = prompts::chunk_header(chunk.index, total);
        match self {
            Task::Summarize => CompletionRequest::prompt(
                prompts::section(
                    &format!("{}\n\n{}", header, prompts::SUMMARY_CHUNK_PROMPT),
                    "Transcript segment",
                    &chunk.text,
                ),
                CHUNK_MAX_TOKENS,
            ),
            Task::DraftEmail(_) => CompletionRequest::prompt(
                prompts::section(
                    &format!("{}\n\n{}", header, prompts::EMAIL_CHUNK_PROMPT),
                    "Transcript segment",
                    &chunk.text,
                ),
                REPLY_MAX_TOKENS,
            ),
            Task::Answer(params) => CompletionRequest::prompt(
                prompts::section(
                    &prompts::section(
                        &format!("{}\n\n{}", header, prompts::ANSWER_CHUNK_PROMPT),
                        "Question",
                        &params.question,
                    ),
                    "Transcript segment",
                    &chunk.text,
                ),
                REPLY_MAX_TOKENS,
            ),
        }
    }

    fn merge_request(&self, merged_partials: &str, _parts: usize) -> CompletionRequest {
        match self {
            Task::Summarize => CompletionRequest::prompt(
                prompts::section(prompts::SUMMARY_MERGE_PROMPT, "Partial extracts", merged_partials),
                MERGE_MAX_TOKENS,
            ),
            Task::DraftEmail(params) => {
                let prompt = prompts::section(
                    &prompts::section(
                        &format!(
                            "{}\n\n{}",
                            Self::email_prompt(params.kind),
                            prompts::EMAIL_MERGE_SUFFIX
                        ),
                        "Meeting summary",
                        Self::summary_or_placeholder(&params.summary),
                    ),
                    "Partial extracts",
                    merged_partials,
                );
                CompletionRequest::prompt(prompt, REPLY_MAX_TOKENS)
            }
            Task::Answer(params) => {
                Self::answer_request(params, "Extracts from the meeting transcript", merged_partials)
            }
        }
    }
}
