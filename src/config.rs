//! Crate configuration.
//!
//! [`RecapConfig`] deserializes from partial JSON (missing fields take their
//! defaults) or loads from `RECAP_*` environment variables.

use crate::llm::LlmConfig;
use crate::pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub const ENV_PROVIDER: &str = "RECAP_PROVIDER";
pub const ENV_MODEL: &str = "RECAP_MODEL";
pub const ENV_BASE_URL: &str = "RECAP_BASE_URL";
pub const ENV_LLM_TIMEOUT_SECS: &str = "RECAP_LLM_TIMEOUT_SECS";
pub const ENV_MAX_CHARS_PER_CHUNK: &str = "RECAP_MAX_CHARS_PER_CHUNK";
pub const ENV_RETRY_ATTEMPTS: &str = "RECAP_RETRY_ATTEMPTS";
pub const ENV_RETRY_DELAY_SECS: &str = "RECAP_RETRY_DELAY_SECS";
pub const ENV_MAP_CONCURRENCY: &str = "RECAP_MAP_CONCURRENCY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecapConfig {
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
}

/// API key variable for a provider
fn api_key_var(provider: &str) -> Option<&'static str> {
    match provider {
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        _ => None,
    }
}

fn parse_var<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}

fn parse_secs(key: &'static str, value: String) -> Result<Duration, ConfigError> {
    let secs: f64 = parse_var(key, value.clone())?;
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::Invalid {
        key,
        value,
        reason: e.to_string(),
    })
}

impl RecapConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any variable lookup; unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(provider) = get(ENV_PROVIDER) {
            config.llm.provider = provider.trim().to_lowercase();
        }
        if let Some(key_var) = api_key_var(&config.llm.provider) {
            if let Some(api_key) = get(key_var) {
                config.llm.api_key = api_key;
            }
        }
        config.llm.model = get(ENV_MODEL);
        config.llm.base_url = get(ENV_BASE_URL);
        if let Some(v) = get(ENV_LLM_TIMEOUT_SECS) {
            config.llm.timeout = parse_secs(ENV_LLM_TIMEOUT_SECS, v)?;
        }

        if let Some(v) = get(ENV_MAX_CHARS_PER_CHUNK) {
            let max_chars: usize = parse_var(ENV_MAX_CHARS_PER_CHUNK, v.clone())?;
            if max_chars == 0 {
                return Err(ConfigError::Invalid {
                    key: ENV_MAX_CHARS_PER_CHUNK,
                    value: v,
                    reason: "must be at least 1".to_string(),
                });
            }
            config.pipeline.max_chars_per_chunk = max_chars;
        }
        if let Some(v) = get(ENV_RETRY_ATTEMPTS) {
            let attempts: u32 = parse_var(ENV_RETRY_ATTEMPTS, v.clone())?;
            if attempts == 0 {
                return Err(ConfigError::Invalid {
                    key: ENV_RETRY_ATTEMPTS,
                    value: v,
                    reason: "must be at least 1".to_string(),
                });
            }
            config.pipeline.retry.max_attempts = attempts;
        }
        if let Some(v) = get(ENV_RETRY_DELAY_SECS) {
            config.pipeline.retry.base_delay = parse_secs(ENV_RETRY_DELAY_SECS, v)?;
        }
        if let Some(v) = get(ENV_MAP_CONCURRENCY) {
            config.pipeline.map_concurrency = parse_var::<usize>(ENV_MAP_CONCURRENCY, v)?.max(1);
        }

        log::debug!(
            "Config: provider={}, chunk budget={}, attempts={}, concurrency={}",
            config.llm.provider,
            config.pipeline.max_chars_per_chunk,
            config.pipeline.retry.max_attempts,
            config.pipeline.map_concurrency
        );
        Ok(config)
    }
}
