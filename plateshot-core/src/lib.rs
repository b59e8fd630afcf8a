pub mod credentials;
pub mod filter;
pub mod generation;
pub mod jobs;
pub mod llm;
pub mod locate;
pub mod pipeline;
pub mod prompt;
pub mod recipes;
pub mod translate;
pub mod upload;

pub use credentials::{CredentialSource, GenCredentials, ResolvedCredentials, SettingsStore};
pub use filter::{filter_prompt, FilterChange, FilterOutcome};
pub use generation::{
    ChatClientFactory, ChatServiceClient, FakeGenerationClient, GenerationClient,
    GenerationClientFactory, GenerationError, RemoteResult,
};
pub use jobs::{ImageJob, JobOutcome, JobStatus, JobStore, JobStoreError, MemoryJobStore};
pub use locate::locate_artifact;
pub use pipeline::{
    GenerateOutcome, GenerateRequest, ImageGenError, ImagePipeline, PipelineConfig, ReferenceImage,
};
pub use prompt::build_prompt;
pub use recipes::{MemoryRecipeSource, RecipeContent, RecipeSource};
pub use upload::{ImageHost, ImageSource, ImgbbHost, MockImageHost, UploadError};
