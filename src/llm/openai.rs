//! OpenAI LLM provider.

use super::{map_transport_error, CompletionRequest, LlmError, LlmProvider, DEFAULT_LLM_TIMEOUT};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OPENAI_API_URL: &str = "https://api.openai.com";
const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI LLM provider using the Chat Completions API
pub struct OpenAiLlmProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Option<Duration>,
}

impl OpenAiLlmProvider {
    /// Create a new OpenAI provider with the given API key
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, DEFAULT_MODEL.to_string())
    }

    /// Create with a specific model
    pub fn with_model(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: OPENAI_API_URL.to_string(),
            timeout: Some(DEFAULT_LLM_TIMEOUT),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disable request timeouts entirely.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    fn uses_max_completion_tokens(model: &str) -> bool {
        // Reasoning models reject the legacy `max_tokens` field.
        ["gpt-5", "o1", "o3", "o4"]
            .iter()
            .any(|prefix| model.starts_with(prefix))
    }
}

#[derive(Debug, Serialize)]
struct ChatMessageBody<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessageBody<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<String>,
}

#[async_trait]
impl LlmProvider for OpenAiLlmProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::NoApiKey("openai".to_string()));
        }

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessageBody {
                role: "system",
                content: system,
            });
        }
        messages.extend(request.messages.iter().map(|m| ChatMessageBody {
            role: m.role.as_str(),
            content: &m.content,
        }));

        let completion_field = Self::uses_max_completion_tokens(&self.model);
        let body = ChatCompletionsRequest {
            model: &self.model,
            messages,
            max_tokens: (!completion_field).then_some(request.max_tokens),
            max_completion_tokens: completion_field.then_some(request.max_tokens),
        };

        let mut req = self
            .client
            .post(format!("{}{}", self.base_url, CHAT_COMPLETIONS_PATH))
            .bearer_auth(&self.api_key)
            .json(&body);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        let response = req
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let (error_type, message) = match serde_json::from_str::<ErrorResponse>(&error_text) {
                // `code` carries the more specific reason (e.g. insufficient_quota).
                Ok(parsed) => (parsed.error.code.or(parsed.error.error_type), parsed.error.message),
                Err(_) => (None, error_text),
            };
            return Err(LlmError::Api {
                provider: "openai",
                status: status.as_u16(),
                error_type,
                message,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| map_transport_error(e, self.timeout))?;
        let completion: ChatCompletionsResponse = serde_json::from_slice(&body).map_err(|e| {
            LlmError::InvalidResponse(format!("Failed to parse response: {}", e))
        })?;

        let message = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| LlmError::InvalidResponse("Response contained no choices".to_string()))?;

        if let Some(refusal) = message.refusal {
            return Err(LlmError::Api {
                provider: "openai",
                status: status.as_u16(),
                error_type: Some("refusal".to_string()),
                message: refusal,
            });
        }

        message
            .content
            .ok_or_else(|| LlmError::InvalidResponse("No text content in response".to_string()))
    }

    fn name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{classify, ErrorCategory};
    use std::io::Write;

    #[test]
    fn test_provider_name() {
        let provider = OpenAiLlmProvider::new("test-key".to_string());
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn test_custom_model() {
        let provider = OpenAiLlmProvider::with_model("test-key".to_string(), "gpt-4".to_string());
        assert_eq!(provider.model(), "gpt-4");
    }

    #[test]
    fn test_token_field_selection() {
        assert!(OpenAiLlmProvider::uses_max_completion_tokens("gpt-5-mini"));
        assert!(OpenAiLlmProvider::uses_max_completion_tokens("o3"));
        assert!(OpenAiLlmProvider::uses_max_completion_tokens("o4-mini"));
        assert!(!OpenAiLlmProvider::uses_max_completion_tokens("gpt-4o-mini"));
        assert!(!OpenAiLlmProvider::uses_max_completion_tokens("open-mistral-nemo"));
        assert!(!OpenAiLlmProvider::uses_max_completion_tokens("olmo-2"));
    }

    #[tokio::test]
    async fn test_complete_sends_system_message_first() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "gpt-4o-mini",
                "max_tokens": 32,
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "question"}
                ]
            })))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"answer"}}]}"#)
            .create_async()
            .await;

        let provider = OpenAiLlmProvider::new("test-key".to_string()).with_base_url(server.url());
        let request = CompletionRequest::prompt("question", 32).with_system("sys");
        assert_eq!(provider.complete(&request).await.unwrap(), "answer");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_code_preferred_over_type() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body(
                r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota","code":"insufficient_quota"}}"#,
            )
            .create_async()
            .await;

        let provider = OpenAiLlmProvider::new("test-key".to_string()).with_base_url(server.url());
        let err = provider
            .complete(&CompletionRequest::prompt("q", 8))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LlmError::Api { status: 429, ref error_type, .. } if error_type.as_deref() == Some("insufficient_quota")
        ));
    }

    #[tokio::test]
    async fn test_stalled_body_is_a_retryable_timeout() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_chunked_body(|w| {
                w.write_all(br#"{"choices":[{"message":"#)?;
                std::thread::sleep(Duration::from_millis(1500));
                w.write_all(br#"{"role":"assistant","content":"late"}}]}"#)
            })
            .create_async()
            .await;

        let provider = OpenAiLlmProvider::new("test-key".to_string())
            .with_base_url(server.url())
            .with_timeout(Duration::from_millis(300));
        let err = provider
            .complete(&CompletionRequest::prompt("q", 8))
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::Timeout(_)), "got {:?}", err);
        assert_eq!(classify(&err), ErrorCategory::Timeout);
        assert!(ErrorCategory::Timeout.is_retryable());
    }
}
