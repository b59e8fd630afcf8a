//! Chat-mediated generation client (Discord-style message API).
//!
//! Submission posts the prompt as a channel message; completion arrives as a
//! later bot message in the same channel carrying an attachment. The client
//! polls the channel itself — callers only await `submit`. Correlation is by
//! message id plus a prompt-prefix match on the reply, since the service
//! does not echo a request id.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::{GenerationClient, GenerationClientFactory, GenerationError, RemoteResult};
use crate::credentials::GenCredentials;

pub const DEFAULT_BASE_URL: &str = "https://discord.com/api/v10";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(300);

/// How much of the prompt is used to recognize the service's reply.
const PROMPT_MATCH_PREFIX: usize = 40;

pub struct ChatServiceClient {
    http: reqwest::Client,
    base_url: String,
    channel_id: String,
    auth_token: String,
    poll_interval: Duration,
    completion_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct CreateMessage<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChannelMessage {
    id: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    attachments: Vec<Attachment>,
    #[serde(default)]
    author: Option<Author>,
}

#[derive(Debug, Deserialize)]
struct Attachment {
    url: String,
}

#[derive(Debug, Deserialize)]
struct Author {
    #[serde(default)]
    bot: bool,
}

impl ChatServiceClient {
    pub fn new(credentials: &GenCredentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            channel_id: credentials.channel_id.clone(),
            auth_token: credentials.auth_token.clone(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timing(mut self, poll_interval: Duration, completion_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.completion_timeout = completion_timeout;
        self
    }

    /// Post the prompt into the channel; returns the message id, which
    /// doubles as the job's correlation id.
    async fn post_prompt(&self, content: &str) -> Result<String, GenerationError> {
        let url = format!("{}/channels/{}/messages", self.base_url, self.channel_id);
        let response = self
            .http
            .post(&url)
            .header("Authorization", &self.auth_token)
            .json(&CreateMessage { content })
            .send()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(GenerationError::ServiceError {
                status,
                message: body,
            });
        }

        let message: ChannelMessage =
            serde_json::from_str(&body).map_err(|e| GenerationError::ParseError(e.to_string()))?;
        Ok(message.id)
    }

    /// Fetch channel messages newer than `after_id`.
    async fn fetch_messages(&self, after_id: &str) -> Result<Vec<ChannelMessage>, GenerationError> {
        let url = format!(
            "{}/channels/{}/messages?after={}&limit=50",
            self.base_url, self.channel_id, after_id
        );
        let response = self
            .http
            .get(&url)
            .header("Authorization", &self.auth_token)
            .send()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(GenerationError::ServiceError {
                status,
                message: body,
            });
        }

        serde_json::from_str(&body).map_err(|e| GenerationError::ParseError(e.to_string()))
    }
}

/// Does `message` look like the service's completed reply to `prompt_key`?
/// Progress updates carry no attachment; the finished message does.
fn is_completion_for(message: &ChannelMessage, prompt_key: &str) -> bool {
    if message.attachments.is_empty() {
        return false;
    }
    if !message.author.as_ref().map(|a| a.bot).unwrap_or(false) {
        return false;
    }
    message.content.to_lowercase().contains(prompt_key)
}

fn prompt_key(prompt: &str) -> String {
    prompt
        .chars()
        .take(PROMPT_MATCH_PREFIX)
        .collect::<String>()
        .to_lowercase()
}

#[async_trait]
impl GenerationClient for ChatServiceClient {
    async fn submit(&self, prompt: &str, params: &str) -> Result<RemoteResult, GenerationError> {
        let content = format!("{} {}", prompt, params);
        let content = content.trim();

        let correlation_id = self.post_prompt(content).await?;
        tracing::info!(
            channel_id = %self.channel_id,
            correlation_id = %correlation_id,
            "prompt submitted, awaiting completion"
        );

        let key = prompt_key(prompt);
        let deadline = Instant::now() + self.completion_timeout;

        loop {
            tokio::time::sleep(self.poll_interval).await;

            if Instant::now() >= deadline {
                return Err(GenerationError::Timeout(self.completion_timeout.as_secs()));
            }

            let messages = match self.fetch_messages(&correlation_id).await {
                Ok(messages) => messages,
                Err(e) => {
                    // Transient poll failures are expected over a multi-minute
                    // wait; only the deadline gives up.
                    tracing::debug!(error = %e, "poll failed, retrying");
                    continue;
                }
            };

            if let Some(done) = messages.iter().find(|m| is_completion_for(m, &key)) {
                tracing::info!(
                    correlation_id = %correlation_id,
                    reply_id = %done.id,
                    "generation completed"
                );
                return Ok(RemoteResult {
                    correlation_id,
                    artifact: done.attachments.first().map(|a| a.url.clone()),
                });
            }
        }
    }
}

/// Factory for per-job chat clients.
pub struct ChatClientFactory {
    base_url: String,
}

impl ChatClientFactory {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Honors `PLATESHOT_GEN_BASE_URL` for pointing at a proxy or test server.
    pub fn from_env() -> Self {
        let base_url = std::env::var("PLATESHOT_GEN_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self { base_url }
    }
}

impl Default for ChatClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationClientFactory for ChatClientFactory {
    fn create(&self, credentials: &GenCredentials) -> Box<dyn GenerationClient> {
        Box::new(ChatServiceClient::new(credentials).with_base_url(self.base_url.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(content: &str, bot: bool, attachments: usize) -> ChannelMessage {
        ChannelMessage {
            id: "m1".to_string(),
            content: content.to_string(),
            attachments: (0..attachments)
                .map(|i| Attachment {
                    url: format!("https://cdn.example/a{}.png", i),
                })
                .collect(),
            author: Some(Author { bot }),
        }
    }

    #[test]
    fn test_completion_requires_attachment() {
        let key = prompt_key("A beautifully plated soup");
        let progress = message("a beautifully plated soup (34%)", true, 0);
        assert!(!is_completion_for(&progress, &key));

        let done = message("A beautifully plated soup - done", true, 1);
        assert!(is_completion_for(&done, &key));
    }

    #[test]
    fn test_completion_requires_bot_author() {
        let key = prompt_key("A beautifully plated soup");
        let echo = message("A beautifully plated soup", false, 1);
        assert!(!is_completion_for(&echo, &key));
    }

    #[test]
    fn test_completion_requires_prompt_match() {
        let key = prompt_key("A beautifully plated soup");
        let other = message("someone else's pasta render", true, 1);
        assert!(!is_completion_for(&other, &key));
    }

    #[test]
    fn test_prompt_key_is_bounded_and_lowercased() {
        let key = prompt_key("A Very Long Prompt That Goes On And On Well Past Forty Characters");
        assert_eq!(key.chars().count(), 40);
        assert_eq!(key, key.to_lowercase());
    }
}
