// Centralized defaults for LLM provider models.
//
// These are used when no model is configured explicitly.
// Keep these in sync with the provider implementations' DEFAULT_MODEL constants.

/// Returns the default model id for a given LLM provider id.
pub fn default_llm_model_for_provider(provider: &str) -> Option<&'static str> {
    match provider {
        "anthropic" => Some("claude-sonnet-4-5-20250929"),
        "openai" => Some("gpt-4o-mini"),
        _ => None,
    }
}
