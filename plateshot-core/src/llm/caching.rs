//! Disk-caching wrapper for text-completion providers.
//!
//! Prompts are keyed by (provider, model, prompt hash); the same prompt to
//! the same model always returns the cached response. Translation prompts
//! repeat a lot across regenerate requests, so this saves real API cost.

use super::{LlmError, LlmProvider};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheMetadata {
    provider: String,
    model: String,
    prompt_hash: String,
    cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedResponse {
    metadata: CacheMetadata,
    response: String,
}

#[derive(Debug)]
pub struct CachingProvider {
    inner: Box<dyn LlmProvider>,
    cache_dir: PathBuf,
}

impl CachingProvider {
    pub fn new(inner: Box<dyn LlmProvider>, cache_dir: PathBuf) -> Self {
        Self { inner, cache_dir }
    }

    /// SHA-256 for stable hashing across Rust versions; first 16 bytes keep
    /// filenames short.
    fn cache_key(&self, prompt: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(prompt.as_bytes());
        hex::encode(&hasher.finalize()[..16])
    }

    fn provider_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .join(self.inner.provider_name())
            .join(self.inner.model_name().replace(['/', ':'], "_"))
    }

    fn cache_path(&self, prompt_hash: &str) -> PathBuf {
        self.provider_cache_dir()
            .join(format!("{}.json", prompt_hash))
    }

    fn get_cached(&self, prompt_hash: &str) -> Option<String> {
        let content = fs::read_to_string(self.cache_path(prompt_hash)).ok()?;
        let cached: CachedResponse = serde_json::from_str(&content).ok()?;
        tracing::debug!(
            provider = self.inner.provider_name(),
            prompt_hash = prompt_hash,
            "LLM cache hit"
        );
        Some(cached.response)
    }

    fn save_to_cache(&self, prompt_hash: &str, response: &str) -> Result<(), LlmError> {
        let dir = self.provider_cache_dir();
        fs::create_dir_all(&dir).map_err(|e| LlmError::CacheError(e.to_string()))?;

        let cached = CachedResponse {
            metadata: CacheMetadata {
                provider: self.inner.provider_name().to_string(),
                model: self.inner.model_name().to_string(),
                prompt_hash: prompt_hash.to_string(),
                cached_at: Utc::now(),
            },
            response: response.to_string(),
        };

        let content = serde_json::to_string_pretty(&cached)
            .map_err(|e| LlmError::CacheError(e.to_string()))?;
        fs::write(self.cache_path(prompt_hash), content)
            .map_err(|e| LlmError::CacheError(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl LlmProvider for CachingProvider {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let prompt_hash = self.cache_key(prompt);

        if let Some(cached) = self.get_cached(&prompt_hash) {
            return Ok(cached);
        }

        let response = self.inner.complete(prompt).await?;

        // Caching is best-effort.
        if let Err(e) = self.save_to_cache(&prompt_hash, &response) {
            tracing::warn!(error = %e, "failed to cache LLM response");
        }

        Ok(response)
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FakeProvider;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_response_is_cached_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let fake = Box::new(FakeProvider::with_response("hello", "world"));
        let provider = CachingProvider::new(fake, temp_dir.path().to_path_buf());

        assert_eq!(provider.complete("hello there").await.unwrap(), "world");

        // The cached file alone must satisfy the second call: hand the
        // wrapper a provider that always fails.
        let broken = Box::new(FakeProvider::failing("should not be called"));
        let provider = CachingProvider::new(broken, temp_dir.path().to_path_buf());
        assert_eq!(provider.complete("hello there").await.unwrap(), "world");
    }

    #[tokio::test]
    async fn test_different_prompts_use_different_keys() {
        let temp_dir = TempDir::new().unwrap();
        let fake = FakeProvider::new();
        fake.add_response("hello", "world");
        fake.add_response("goodbye", "farewell");
        let provider = CachingProvider::new(Box::new(fake), temp_dir.path().to_path_buf());

        assert_eq!(provider.complete("hello there").await.unwrap(), "world");
        assert_eq!(provider.complete("goodbye now").await.unwrap(), "farewell");
    }
}
