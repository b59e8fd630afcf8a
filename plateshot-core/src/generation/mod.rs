//! Generation-service client abstraction.
//!
//! The external service is chat-mediated: a prompt is posted as a message
//! into a channel and the service replies asynchronously in the same
//! channel. `submit` spans the whole exchange; callers await it rather than
//! polling. Clients are constructed fresh per job, bound to one set of
//! credentials, so session state never bleeds between jobs.

mod chat;
mod fake;

pub use chat::{ChatClientFactory, ChatServiceClient};
pub use fake::FakeGenerationClient;

use async_trait::async_trait;
use thiserror::Error;

use crate::credentials::GenCredentials;

/// What the service handed back for a submission.
#[derive(Debug, Clone)]
pub struct RemoteResult {
    /// Opaque identifier for the in-flight remote request.
    pub correlation_id: String,
    /// Artifact reference, when the service provides one. May be a remote
    /// location rather than a file the pipeline owns; the result locator
    /// decides whether it is directly usable.
    pub artifact: Option<String>,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    RequestFailed(String),

    #[error("Generation service returned error: {status} - {message}")]
    ServiceError { status: u16, message: String },

    #[error("Timed out waiting for generation to complete after {0} seconds")]
    Timeout(u64),

    #[error("Failed to parse service response: {0}")]
    ParseError(String),
}

/// A client bound to one job's credentials.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Submit a prompt (plus fixed style parameters) and await the service's
    /// completion signal. Long-running: tens of seconds to minutes.
    async fn submit(&self, prompt: &str, params: &str) -> Result<RemoteResult, GenerationError>;
}

/// Constructs a fresh client per job. Never share a client across jobs;
/// different jobs may carry different credentials.
pub trait GenerationClientFactory: Send + Sync {
    fn create(&self, credentials: &GenCredentials) -> Box<dyn GenerationClient>;
}
