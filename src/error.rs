//! Failure taxonomy for completion calls.
//!
//! Every provider failure is mapped into exactly one [`ErrorCategory`] at the
//! boundary. Pipeline logic only reasons about categories; callers only ever
//! see a [`ClassifiedError`].

use crate::llm::LlmError;
use crate::pipeline::Stage;
use crate::retry::InvocationFailure;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of failure classifications surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    /// Malformed or rejected request
    InvalidRequest,
    /// Service throttling
    RateLimited,
    /// Service did not respond in time
    Timeout,
    /// Generic service-side error
    UpstreamFault,
    /// Invalid credentials to the service
    AuthFailure,
    /// Account or billing limit reached
    QuotaExhausted,
    /// Unclassified failure shape
    Unexpected,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 7] = [
        ErrorCategory::InvalidRequest,
        ErrorCategory::RateLimited,
        ErrorCategory::Timeout,
        ErrorCategory::UpstreamFault,
        ErrorCategory::AuthFailure,
        ErrorCategory::QuotaExhausted,
        ErrorCategory::Unexpected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::InvalidRequest => "invalid-request",
            ErrorCategory::RateLimited => "rate-limited",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::UpstreamFault => "upstream-fault",
            ErrorCategory::AuthFailure => "auth-failure",
            ErrorCategory::QuotaExhausted => "quota-exhausted",
            ErrorCategory::Unexpected => "unexpected",
        }
    }

    /// Whether a failure of this category is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::RateLimited | ErrorCategory::Timeout | ErrorCategory::UpstreamFault
        )
    }

    /// HTTP status a web layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCategory::InvalidRequest => 400,
            ErrorCategory::AuthFailure => 401,
            ErrorCategory::QuotaExhausted => 402,
            ErrorCategory::RateLimited => 429,
            ErrorCategory::UpstreamFault => 502,
            ErrorCategory::Timeout => 504,
            ErrorCategory::Unexpected => 500,
        }
    }

    /// Log level used when a run ends with this category.
    pub fn severity(&self) -> log::Level {
        match self {
            ErrorCategory::InvalidRequest | ErrorCategory::RateLimited | ErrorCategory::Timeout => {
                log::Level::Warn
            }
            ErrorCategory::UpstreamFault
            | ErrorCategory::AuthFailure
            | ErrorCategory::QuotaExhausted
            | ErrorCategory::Unexpected => log::Level::Error,
        }
    }

    /// Caller-facing message. Only invalid requests echo the service detail.
    pub fn user_message(&self, detail: &str) -> String {
        match self {
            ErrorCategory::InvalidRequest => format!("API error: {}", detail),
            ErrorCategory::RateLimited => "Rate limited. Wait a moment and try again.".to_string(),
            ErrorCategory::Timeout => "API timed out after retries. Try again.".to_string(),
            ErrorCategory::UpstreamFault => {
                "The language model service failed. Try again.".to_string()
            }
            ErrorCategory::AuthFailure => {
                "Invalid API key. Check the provider API key configuration.".to_string()
            }
            ErrorCategory::QuotaExhausted => {
                "No API credits. Add credits in the provider's billing console.".to_string()
            }
            ErrorCategory::Unexpected => {
                "Unexpected error while generating the response.".to_string()
            }
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a provider failure to its category. Pure and deterministic.
pub fn classify(error: &LlmError) -> ErrorCategory {
    match error {
        LlmError::NoApiKey(_) => ErrorCategory::AuthFailure,
        LlmError::Timeout(_) => ErrorCategory::Timeout,
        LlmError::Network(e) => {
            if e.is_timeout() {
                ErrorCategory::Timeout
            } else if e.is_decode() || e.is_builder() {
                ErrorCategory::Unexpected
            } else {
                ErrorCategory::UpstreamFault
            }
        }
        LlmError::Api {
            status,
            error_type,
            message,
            ..
        } => classify_api(*status, error_type.as_deref(), message),
        LlmError::InvalidResponse(_) | LlmError::ProviderNotAvailable(_) => ErrorCategory::Unexpected,
    }
}

fn classify_api(status: u16, error_type: Option<&str>, message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();
    if lower.contains("credit balance") || lower.contains("exceeded your current quota") {
        return ErrorCategory::QuotaExhausted;
    }

    let by_type = match error_type {
        Some("invalid_request_error" | "not_found_error" | "request_too_large" | "refusal") => {
            Some(ErrorCategory::InvalidRequest)
        }
        Some("authentication_error" | "permission_error" | "invalid_api_key") => {
            Some(ErrorCategory::AuthFailure)
        }
        Some("billing_error" | "insufficient_quota") => Some(ErrorCategory::QuotaExhausted),
        Some("rate_limit_error" | "rate_limit_exceeded") => Some(ErrorCategory::RateLimited),
        Some("timeout_error") => Some(ErrorCategory::Timeout),
        Some("api_error" | "overloaded_error" | "server_error") => Some(ErrorCategory::UpstreamFault),
        _ => None,
    };
    if let Some(category) = by_type {
        return category;
    }

    match status {
        400 | 404 | 413 | 422 => ErrorCategory::InvalidRequest,
        401 | 403 => ErrorCategory::AuthFailure,
        402 => ErrorCategory::QuotaExhausted,
        429 => ErrorCategory::RateLimited,
        408 | 504 => ErrorCategory::Timeout,
        500..=599 => ErrorCategory::UpstreamFault,
        _ => ErrorCategory::Unexpected,
    }
}

/// The single failure a caller receives when a run does not produce an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    /// Stage that failed; `None` when the input was rejected before any call
    pub stage: Option<Stage>,
    /// Provider calls made for the failing stage
    pub attempts: u32,
    /// Caller-facing message
    pub message: String,
    /// Operator-facing detail
    #[serde(skip)]
    pub detail: String,
}

impl ClassifiedError {
    /// Reject caller input without contacting the service.
    pub fn invalid_input(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self {
            category: ErrorCategory::InvalidRequest,
            stage: None,
            attempts: 0,
            message: detail.clone(),
            detail,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.category.status_code()
    }
}

/// Translate an exhausted or fatal invocation into the caller-visible error.
///
/// Unexpected failures are logged with full debug detail; the caller only
/// gets the generic message.
pub fn translate(failure: &InvocationFailure, stage: Stage) -> ClassifiedError {
    let category = failure.category;
    let detail = failure.error.to_string();

    if category == ErrorCategory::Unexpected {
        log::error!(
            "Classifier: unexpected failure in {} after {} attempt(s): {:?}",
            stage,
            failure.attempts.len(),
            failure.error
        );
    } else {
        log::log!(
            category.severity(),
            "Classifier: {} failed with {} ({:?}) after {} attempt(s): {}",
            stage,
            category,
            failure.kind,
            failure.attempts.len(),
            detail
        );
    }

    let message = match category {
        ErrorCategory::InvalidRequest => category.user_message(&api_message(&failure.error)),
        _ => category.user_message(""),
    };

    ClassifiedError {
        category,
        stage: Some(stage),
        attempts: failure.attempts.len() as u32,
        message,
        detail,
    }
}

fn api_message(error: &LlmError) -> String {
    match error {
        LlmError::Api { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
