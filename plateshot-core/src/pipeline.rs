//! The image-generation pipeline.
//!
//! One awaited pass per request: resolve credentials, assemble and filter
//! the prompt, open a job row, submit to the generation service, correlate
//! the resulting artifact, finalize. Every exit path leaves the job row
//! terminal and runs the superseding sweep, so a recipe can never stay
//! stuck looking "in progress" after the call returns.

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::credentials::{self, CredentialsError, GenCredentials, SettingsStore};
use crate::filter::{filter_prompt, FilterChange, FilterOutcome};
use crate::generation::{GenerationClientFactory, GenerationError};
use crate::jobs::{JobOutcome, JobStore, JobStoreError, ARTIFACT_NOT_FOUND_REASON};
use crate::llm::LlmProvider;
use crate::locate::{locate_artifact, DEFAULT_RECENCY_WINDOW};
use crate::prompt::build_prompt;
use crate::recipes::{RecipeSource, RecipeSourceError};
use crate::translate::{translate_prompt, WORKING_LANGUAGE};
use crate::upload::{ImageHost, ImageSource};

/// Fixed service parameters appended to every submission.
pub const DEFAULT_STYLE_PARAMS: &str = "--ar 3:2 --style raw";

#[derive(Debug, Error)]
pub enum ImageGenError {
    #[error(transparent)]
    CredentialsMissing(#[from] CredentialsError),

    #[error("Recipe not found: {0}")]
    RecipeNotFound(Uuid),

    #[error("Prompt rejected: {0}")]
    ContentRejected(String),

    #[error("Generation service error: {0}")]
    GenerationService(#[from] GenerationError),

    #[error("{}", ARTIFACT_NOT_FOUND_REASON)]
    ArtifactNotFound,

    #[error("Job store error: {0}")]
    JobStore(#[from] JobStoreError),

    #[error("Recipe lookup failed: {0}")]
    RecipeSource(#[from] RecipeSourceError),
}

/// A reference image for the prompt, in whatever form the caller has it.
#[derive(Debug, Clone)]
pub enum ReferenceImage {
    /// Already publicly reachable; used verbatim.
    Url(String),
    /// Local file; published through the image host first.
    Local(PathBuf),
    /// Inline base64 payload; published through the image host first.
    Inline(String),
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub recipe_id: Uuid,
    /// Bypasses the prompt builder but not the content filter.
    pub custom_prompt: Option<String>,
    pub reference_image: Option<ReferenceImage>,
    /// Request-scoped credentials, first in the resolver's fallback chain.
    pub credentials: Option<GenCredentials>,
}

impl GenerateRequest {
    pub fn new(recipe_id: Uuid) -> Self {
        Self {
            recipe_id,
            custom_prompt: None,
            reference_image: None,
            credentials: None,
        }
    }

    pub fn with_custom_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_prompt = Some(prompt.into());
        self
    }

    pub fn with_reference_image(mut self, reference: ReferenceImage) -> Self {
        self.reference_image = Some(reference);
        self
    }

    pub fn with_credentials(mut self, credentials: GenCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// Terminal result handed back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateOutcome {
    pub success: bool,
    pub job_id: Option<Uuid>,
    pub image_path: Option<String>,
    pub error: Option<String>,
}

impl GenerateOutcome {
    fn completed(job_id: Uuid, image_path: String) -> Self {
        Self {
            success: true,
            job_id: Some(job_id),
            image_path: Some(image_path),
            error: None,
        }
    }

    fn failed(job_id: Option<Uuid>, error: String) -> Self {
        Self {
            success: false,
            job_id,
            image_path: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Flat directory the finished images get deposited into.
    pub artifact_dir: PathBuf,
    /// How far back the artifact scan looks.
    pub recency_window: Duration,
    /// Service parameters appended to every prompt.
    pub style_params: String,
    /// Bounds (ms) for the randomized pre-submission delay. Keeps the
    /// request stream from presenting as an automated burst.
    pub pacing_ms: RangeInclusive<u64>,
    /// When set and different from the working language, prompts are
    /// translated before filtering.
    pub target_language: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            artifact_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from("downloads")),
            recency_window: DEFAULT_RECENCY_WINDOW,
            style_params: DEFAULT_STYLE_PARAMS.to_string(),
            pacing_ms: 2000..=6000,
            target_language: None,
        }
    }
}

pub struct ImagePipeline {
    jobs: Arc<dyn JobStore>,
    recipes: Arc<dyn RecipeSource>,
    clients: Arc<dyn GenerationClientFactory>,
    host: Arc<dyn ImageHost>,
    translator: Option<Arc<dyn LlmProvider>>,
    settings: Option<Arc<dyn SettingsStore>>,
    config: PipelineConfig,
}

impl ImagePipeline {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        recipes: Arc<dyn RecipeSource>,
        clients: Arc<dyn GenerationClientFactory>,
        host: Arc<dyn ImageHost>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            jobs,
            recipes,
            clients,
            host,
            translator: None,
            settings: None,
            config,
        }
    }

    pub fn with_translator(mut self, translator: Arc<dyn LlmProvider>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn with_settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Run one generation request through to a terminal state.
    ///
    /// Always returns: failures surface in the outcome, not as panics or
    /// errors, and any job row created along the way is finalized before
    /// this returns.
    pub async fn generate(&self, request: GenerateRequest) -> GenerateOutcome {
        let recipe_id = request.recipe_id;

        // Failures before a job row exists report straight to the caller.
        let resolved =
            match credentials::resolve(request.credentials.as_ref(), self.settings.as_deref()) {
                Ok(resolved) => resolved,
                Err(e) => {
                    tracing::warn!(recipe_id = %recipe_id, "generation refused: {}", e);
                    return GenerateOutcome::failed(None, e.to_string());
                }
            };
        tracing::debug!(recipe_id = %recipe_id, source = ?resolved.source, "credentials resolved");

        let recipe = match self.recipes.get_content(recipe_id) {
            Ok(Some(recipe)) => recipe,
            Ok(None) => {
                let e = ImageGenError::RecipeNotFound(recipe_id);
                return GenerateOutcome::failed(None, e.to_string());
            }
            Err(e) => {
                let e = ImageGenError::from(e);
                tracing::error!(recipe_id = %recipe_id, error = %e, "recipe lookup failed");
                return GenerateOutcome::failed(None, e.to_string());
            }
        };

        let reference_url = self.resolve_reference(request.reference_image.as_ref()).await;

        let assembled = match &request.custom_prompt {
            Some(custom) => match &reference_url {
                // The reference must still lead the prompt, custom or not.
                Some(url) if !custom.starts_with(url.as_str()) => {
                    format!("{} {}", url, custom)
                }
                _ => custom.clone(),
            },
            None => build_prompt(&recipe, reference_url.as_deref()),
        };

        let translated = match (&self.translator, &self.config.target_language) {
            (Some(provider), Some(language)) if language != WORKING_LANGUAGE => {
                translate_prompt(provider.as_ref(), &assembled, language).await
            }
            _ => assembled,
        };

        // Last gate before the service sees the prompt.
        let (final_prompt, changes) = match filter_prompt(&translated) {
            FilterOutcome::Passed { filtered, changes } => (filtered, changes),
            FilterOutcome::Rejected { reason } => {
                tracing::warn!(recipe_id = %recipe_id, reason = %reason, "prompt rejected by filter");
                return self.record_rejection(recipe_id, &translated, &reason);
            }
        };

        let job_id = match self.open_job(recipe_id, &final_prompt, &changes) {
            Ok(job_id) => job_id,
            Err(e) => {
                tracing::error!(recipe_id = %recipe_id, error = %e, "failed to open job");
                return GenerateOutcome::failed(None, e.to_string());
            }
        };
        tracing::info!(recipe_id = %recipe_id, job_id = %job_id, "image job created");

        let outcome = match self
            .run_job(job_id, &resolved.credentials, &final_prompt)
            .await
        {
            Ok(image_path) => {
                tracing::info!(job_id = %job_id, image_path = %image_path, "image job completed");
                GenerateOutcome::completed(job_id, image_path)
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "image job failed");
                GenerateOutcome::failed(Some(job_id), e.to_string())
            }
        };

        // The sweep runs on success and on every failure path, so a stale
        // row can never outlive the request that replaced it.
        self.sweep(recipe_id, job_id);

        outcome
    }

    /// Submit and finalize one job. The job row is terminal when this
    /// returns, whichever way it went.
    async fn run_job(
        &self,
        job_id: Uuid,
        credentials: &GenCredentials,
        prompt: &str,
    ) -> Result<String, ImageGenError> {
        // Fresh client per job; no session bleed between credentials.
        let client = self.clients.create(credentials);

        self.pacing_delay().await;

        if let Err(e) = self.jobs.mark_generating(job_id) {
            let e = ImageGenError::from(e);
            self.finalize_failed(job_id, None, &e);
            return Err(e);
        }

        let remote = match client.submit(prompt, &self.config.style_params).await {
            Ok(remote) => remote,
            Err(e) => {
                let e = ImageGenError::from(e);
                self.finalize_failed(job_id, None, &e);
                return Err(e);
            }
        };

        match locate_artifact(&remote, &self.config.artifact_dir, self.config.recency_window) {
            Some(image_path) => {
                self.finalize(
                    job_id,
                    JobOutcome::completed(&image_path, &remote.correlation_id),
                );
                Ok(image_path)
            }
            None => {
                // The service may have reported success; an artifact we
                // cannot find is still treated as a failed job.
                let e = ImageGenError::ArtifactNotFound;
                self.finalize_failed(job_id, Some(&remote.correlation_id), &e);
                Err(e)
            }
        }
    }

    /// Record a filter rejection: the job row goes straight to `failed`
    /// without the service ever seeing the prompt.
    fn record_rejection(&self, recipe_id: Uuid, prompt: &str, reason: &str) -> GenerateOutcome {
        let job_id = match self.open_job(recipe_id, prompt, &[]) {
            Ok(job_id) => job_id,
            Err(e) => {
                tracing::error!(recipe_id = %recipe_id, error = %e, "failed to record rejected job");
                return GenerateOutcome::failed(None, reason.to_string());
            }
        };
        self.finalize(job_id, JobOutcome::failed(reason, None));
        self.sweep(recipe_id, job_id);
        GenerateOutcome::failed(Some(job_id), reason.to_string())
    }

    /// Clear stale unfinished rows, then insert the new one. Two separate
    /// statements; see [`JobStore::clear_unfinished`] for the race this
    /// leaves open and the sweep that bounds it.
    fn open_job(
        &self,
        recipe_id: Uuid,
        prompt: &str,
        changes: &[FilterChange],
    ) -> Result<Uuid, JobStoreError> {
        let cleared = self.jobs.clear_unfinished(recipe_id)?;
        if cleared > 0 {
            tracing::info!(recipe_id = %recipe_id, cleared, "failed out stale unfinished jobs");
        }
        self.jobs.create(recipe_id, prompt, changes)
    }

    /// Publish a not-yet-public reference image. Upload failure degrades to
    /// generating without the reference; it never fails the job.
    async fn resolve_reference(&self, reference: Option<&ReferenceImage>) -> Option<String> {
        let source = match reference? {
            ReferenceImage::Url(url) => return Some(url.clone()),
            ReferenceImage::Local(path) => ImageSource::Path(path.clone()),
            ReferenceImage::Inline(payload) => ImageSource::Base64(payload.clone()),
        };
        match self.host.upload(&source).await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(error = %e, "reference upload failed, continuing without reference");
                None
            }
        }
    }

    async fn pacing_delay(&self) {
        let wait = rand::rng().random_range(self.config.pacing_ms.clone());
        if wait > 0 {
            tokio::time::sleep(Duration::from_millis(wait)).await;
        }
    }

    fn finalize(&self, job_id: Uuid, outcome: JobOutcome) {
        if let Err(e) = self.jobs.finalize(job_id, &outcome) {
            tracing::error!(job_id = %job_id, error = %e, "failed to finalize job");
        }
    }

    fn finalize_failed(&self, job_id: Uuid, correlation_id: Option<&str>, error: &ImageGenError) {
        self.finalize(job_id, JobOutcome::failed(&error.to_string(), correlation_id));
    }

    fn sweep(&self, recipe_id: Uuid, keep_job_id: Uuid) {
        match self.jobs.supersede_others(recipe_id, keep_job_id) {
            Ok(swept) if swept > 0 => {
                tracing::info!(recipe_id = %recipe_id, swept, "superseded stale jobs");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(recipe_id = %recipe_id, error = %e, "superseding sweep failed");
            }
        }
    }
}
