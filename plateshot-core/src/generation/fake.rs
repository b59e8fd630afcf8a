//! Recording fake for the generation client, used by pipeline tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{GenerationClient, GenerationClientFactory, GenerationError, RemoteResult};
use crate::credentials::GenCredentials;

#[derive(Debug, Clone)]
enum Scripted {
    Success {
        correlation_id: String,
        artifact: Option<String>,
    },
    Failure(String),
}

#[derive(Default)]
struct FakeState {
    script: VecDeque<Scripted>,
    submissions: Vec<String>,
    clients_created: usize,
}

/// Shared-state fake: clones hand out the same script and the same
/// submission log, so a test can use one instance as both factory and
/// assertion surface.
#[derive(Clone, Default)]
pub struct FakeGenerationClient {
    state: Arc<Mutex<FakeState>>,
}

impl FakeGenerationClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a success whose artifact is directly usable (a local filename).
    pub fn with_direct_artifact(self, artifact: &str) -> Self {
        self.push(Scripted::Success {
            correlation_id: format!("corr-{}", artifact),
            artifact: Some(artifact.to_string()),
        });
        self
    }

    /// Queue a success carrying only a correlation id.
    pub fn with_correlation_only(self, correlation_id: &str) -> Self {
        self.push(Scripted::Success {
            correlation_id: correlation_id.to_string(),
            artifact: None,
        });
        self
    }

    /// Queue a submission failure.
    pub fn with_failure(self, message: &str) -> Self {
        self.push(Scripted::Failure(message.to_string()));
        self
    }

    fn push(&self, scripted: Scripted) {
        self.state.lock().unwrap().script.push_back(scripted);
    }

    /// Full prompts submitted so far (prompt + params as sent).
    pub fn submissions(&self) -> Vec<String> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.state.lock().unwrap().submissions.len()
    }

    /// How many per-job clients the factory handed out.
    pub fn clients_created(&self) -> usize {
        self.state.lock().unwrap().clients_created
    }
}

#[async_trait]
impl GenerationClient for FakeGenerationClient {
    async fn submit(&self, prompt: &str, params: &str) -> Result<RemoteResult, GenerationError> {
        let scripted = {
            let mut state = self.state.lock().unwrap();
            state.submissions.push(format!("{} {}", prompt, params));
            state.script.pop_front()
        };

        match scripted {
            Some(Scripted::Success {
                correlation_id,
                artifact,
            }) => Ok(RemoteResult {
                correlation_id,
                artifact,
            }),
            Some(Scripted::Failure(message)) => Err(GenerationError::RequestFailed(message)),
            // Unscripted: correlation only, exercising the locator fallback.
            None => Ok(RemoteResult {
                correlation_id: "corr-unscripted".to_string(),
                artifact: None,
            }),
        }
    }
}

impl GenerationClientFactory for FakeGenerationClient {
    fn create(&self, _credentials: &GenCredentials) -> Box<dyn GenerationClient> {
        self.state.lock().unwrap().clients_created += 1;
        Box::new(self.clone())
    }
}
