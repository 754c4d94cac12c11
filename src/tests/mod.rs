//! End-to-end tests and shared test doubles.
//!
//! The pipeline is driven through [`ScriptedProvider`], an in-process
//! [`LlmProvider`] that either replays a fixed script of replies or echoes each
//! request back after a per-call delay. Tests run on paused tokio time so
//! backoff sleeps finish instantly.


use crate::llm::{CompletionRequest, LlmError, LlmProvider};
use crate::pipeline::RequestFactory;
use crate::segment::Chunk;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Service failure with an HTTP status and provider error type.
pub(crate) fn api_error(status: u16, error_type: &str, message: &str) -> LlmError {
    LlmError::Api {
        provider: "anthropic",
        status,
        error_type: Some(error_type.to_string()),
        message: message.to_string(),
    }
}

pub(crate) struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    /// When set, every call echoes its last user message after this delay
    echo_delays: Option<Vec<Duration>>,
    /// Echo call that fails instead, after its delay
    echo_failure: Mutex<Option<(usize, LlmError)>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    /// Replay `script` in order; calls past its end fail as unexpected.
    pub(crate) fn new(script: Vec<Result<String, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            echo_delays: None,
            echo_failure: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Echo each request; call `n` sleeps `delays[n]` first.
    pub(crate) fn echo_with_delays(delays: Vec<Duration>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            echo_delays: Some(delays),
            echo_failure: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Like [`Self::echo_with_delays`], but call `failing_call` returns `error`.
    pub(crate) fn echo_failing_at(
        delays: Vec<Duration>,
        failing_call: usize,
        error: LlmError,
    ) -> Arc<Self> {
        let provider = Self::echo_with_delays(delays);
        *provider.echo_failure.lock().unwrap() = Some((failing_call, error));
        provider
    }

    pub(crate) fn echo() -> Arc<Self> {
        Self::echo_with_delays(Vec::new())
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Last user message of every request, in call order.
    pub(crate) fn prompts(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| r.last_user_content().unwrap_or_default().to_string())
            .collect()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };

        if let Some(delays) = &self.echo_delays {
            let delay = delays.get(call).copied().unwrap_or_default();
            tokio::time::sleep(delay).await;
            let failure = {
                let mut slot = self.echo_failure.lock().unwrap();
                match slot.as_ref() {
                    Some((failing_call, _)) if *failing_call == call => slot.take(),
                    _ => None,
                }
            };
            if let Some((_, error)) = failure {
                return Err(error);
            }
            return Ok(request.last_user_content().unwrap_or_default().to_string());
        }

        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::InvalidResponse("script exhausted".to_string())))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }
}

/// Factory whose requests are just the stage name and its input.
pub(crate) struct EchoFactory;

impl RequestFactory for EchoFactory {
    fn label(&self) -> &str {
        "echo"
    }

    fn single_request(&self, transcript: &str) -> CompletionRequest {
        CompletionRequest::prompt(format!("single:{}", transcript), 16)
    }

    fn chunk_request(&self, chunk: &Chunk, _total: usize) -> CompletionRequest {
        CompletionRequest::prompt(format!("chunk:{}", chunk.text), 16)
    }

    fn merge_request(&self, merged_partials: &str, _parts: usize) -> CompletionRequest {
        CompletionRequest::prompt(format!("merge:{}", merged_partials), 16)
    }
}
