//! Text-completion provider abstraction.
//!
//! The pipeline uses a small LLM call to rewrite prompts into the configured
//! language. The trait keeps the provider swappable and testable: a real
//! Claude-backed provider, a disk-caching wrapper, and a deterministic fake
//! for tests.

mod caching;
mod claude;
mod fake;

pub use caching::CachingProvider;
pub use claude::ClaudeProvider;
pub use fake::FakeProvider;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("API returned error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Rate limited, retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Cache error: {0}")]
    CacheError(String),
}

/// Trait for text-completion providers.
///
/// Implementations should be stateless and thread-safe.
#[async_trait]
pub trait LlmProvider: Send + Sync + fmt::Debug {
    /// Send a prompt and get the model's text response.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    /// Provider name (e.g., "claude", "fake").
    fn provider_name(&self) -> &'static str;

    /// Model name (e.g., "claude-3-5-haiku-20241022").
    fn model_name(&self) -> &str;
}

/// Build a provider from environment variables:
/// - `PLATESHOT_TRANSLATE_PROVIDER`: "claude" | "fake" (default: "fake")
/// - `ANTHROPIC_API_KEY`: API key for Claude
/// - `PLATESHOT_TRANSLATE_MODEL`: model name override
pub fn create_provider_from_env() -> Result<Box<dyn LlmProvider>, LlmError> {
    let provider =
        std::env::var("PLATESHOT_TRANSLATE_PROVIDER").unwrap_or_else(|_| "fake".to_string());

    match provider.as_str() {
        "fake" => Ok(Box::new(FakeProvider::default())),
        "claude" => {
            let api_key = std::env::var("ANTHROPIC_API_KEY")
                .map_err(|_| LlmError::NotConfigured("ANTHROPIC_API_KEY not set".to_string()))?;
            let model = std::env::var("PLATESHOT_TRANSLATE_MODEL")
                .unwrap_or_else(|_| claude::DEFAULT_MODEL.to_string());
            Ok(Box::new(ClaudeProvider::new(api_key, model)))
        }
        other => Err(LlmError::NotConfigured(format!(
            "Unknown provider: {}",
            other
        ))),
    }
}

/// Like [`create_provider_from_env`] but wrapped in a disk cache, so repeated
/// translations of the same prompt cost one API call.
///
/// Cache directory comes from `PLATESHOT_LLM_CACHE_DIR`, defaulting to
/// `~/.plateshot/llm-cache`.
pub fn create_cached_provider_from_env() -> Result<Box<dyn LlmProvider>, LlmError> {
    let inner = create_provider_from_env()?;

    let cache_dir = std::env::var("PLATESHOT_LLM_CACHE_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".plateshot").join("llm-cache"))
                .unwrap_or_else(|| std::path::PathBuf::from(".cache/llm"))
        });

    Ok(Box::new(CachingProvider::new(inner, cache_dir)))
}
