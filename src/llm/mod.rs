//! LLM providers for transcript completions.
//!
//! This module defines the outbound capability the orchestration pipeline
//! depends on: a provider accepts a [`CompletionRequest`] and returns text, or
//! fails with an [`LlmError`] that carries enough shape (HTTP status, error
//! type) to be classified. Anthropic and OpenAI implementations are provided.

mod anthropic;
mod defaults;
mod openai;

pub use anthropic::AnthropicLlmProvider;
pub use defaults::default_llm_model_for_provider;
pub use openai::OpenAiLlmProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default timeout for LLM API requests
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(60);

/// Default provider id
pub const DEFAULT_LLM_PROVIDER: &str = "anthropic";

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        /// Provider error type, e.g. `rate_limit_error`
        error_type: Option<String>,
        message: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("No API key configured for provider: {0}")]
    NoApiKey(String),

    #[error("Provider not available: {0}")]
    ProviderNotAvailable(String),
}

/// Message author within a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single request to a completion service.
///
/// The pipeline never inspects its contents; task factories build it and
/// providers translate it to their wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// A request consisting of one user message.
    pub fn prompt(content: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system: None,
            messages: vec![ChatMessage::user(content)],
            max_tokens,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Text of the last user message, if any.
    pub fn last_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Trait for LLM providers that complete requests
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete a request and return the response text
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;

    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Get the current model being used
    fn model(&self) -> &str;
}

/// Configuration for the LLM provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// The provider to use (anthropic, openai)
    pub provider: String,
    /// API key for the provider
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Model to use; the provider default when unset
    pub model: Option<String>,
    /// Override for the provider API base URL
    pub base_url: Option<String>,
    /// Per-request timeout
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_LLM_PROVIDER.to_string(),
            api_key: String::new(),
            model: None,
            base_url: None,
            timeout: DEFAULT_LLM_TIMEOUT,
        }
    }
}

/// Build the provider selected by `config`.
pub fn create_llm_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.as_str() {
        "anthropic" => {
            let mut provider = match &config.model {
                Some(model) => AnthropicLlmProvider::with_model(config.api_key.clone(), model.clone()),
                None => AnthropicLlmProvider::new(config.api_key.clone()),
            };
            if let Some(url) = &config.base_url {
                provider = provider.with_base_url(url.clone());
            }
            Ok(Arc::new(provider.with_timeout(config.timeout)))
        }
        "openai" => {
            let mut provider = match &config.model {
                Some(model) => OpenAiLlmProvider::with_model(config.api_key.clone(), model.clone()),
                None => OpenAiLlmProvider::new(config.api_key.clone()),
            };
            if let Some(url) = &config.base_url {
                provider = provider.with_base_url(url.clone());
            }
            Ok(Arc::new(provider.with_timeout(config.timeout)))
        }
        other => Err(LlmError::ProviderNotAvailable(other.to_string())),
    }
}

/// Map a failure while sending a request or reading its body.
///
/// Client-side timeouts become [`LlmError::Timeout`]; everything else stays a
/// network error so it can be retried.
pub(crate) fn map_transport_error(e: reqwest::Error, timeout: Option<Duration>) -> LlmError {
    match timeout {
        Some(timeout) if e.is_timeout() => LlmError::Timeout(timeout),
        _ => LlmError::Network(e),
    }
}

/// Serialize durations as fractional seconds.
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|e| {
            serde::de::Error::custom(format!("invalid duration in seconds {}: {}", secs, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_config_default() {
        let config = LlmConfig::default();
        assert_eq!(config.provider, "anthropic");
        assert_eq!(config.timeout, DEFAULT_LLM_TIMEOUT);
        assert!(config.model.is_none());
    }

    #[test]
    fn test_llm_config_partial_json() {
        let config: LlmConfig =
            serde_json::from_str(r#"{"provider": "openai", "timeout": 12.5}"#).unwrap();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.timeout, Duration::from_millis(12_500));
        assert!(config.api_key.is_empty());
    }

    #[test]
    fn test_llm_config_rejects_negative_timeout() {
        let result: Result<LlmConfig, _> = serde_json::from_str(r#"{"timeout": -1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_llm_config_rejects_overflowing_timeout() {
        let result: Result<LlmConfig, _> = serde_json::from_str(r#"{"timeout": 1e300}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_create_provider_by_name() {
        let config = LlmConfig {
            api_key: "test-key".to_string(),
            ..Default::default()
        };
        let provider = create_llm_provider(&config).unwrap();
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.model(), default_llm_model_for_provider("anthropic").unwrap());

        let config = LlmConfig {
            provider: "openai".to_string(),
            model: Some("gpt-4.1".to_string()),
            ..Default::default()
        };
        let provider = create_llm_provider(&config).unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.model(), "gpt-4.1");
    }

    #[test]
    fn test_create_unknown_provider_fails() {
        let config = LlmConfig {
            provider: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            create_llm_provider(&config),
            Err(LlmError::ProviderNotAvailable(name)) if name == "carrier-pigeon"
        ));
    }

    #[test]
    fn test_last_user_content() {
        let request = CompletionRequest {
            system: Some("sys".to_string()),
            messages: vec![
                ChatMessage::user("first"),
                ChatMessage::assistant("reply"),
                ChatMessage::user("second"),
            ],
            max_tokens: 10,
        };
        assert_eq!(request.last_user_content(), Some("second"));
    }
}
