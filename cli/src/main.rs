use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use plateshot_core::credentials::{SETTING_AUTH_TOKEN, SETTING_CHANNEL_ID};
use plateshot_core::llm::create_cached_provider_from_env;
use plateshot_core::{
    ChatClientFactory, GenerateRequest, ImageHost, ImageSource, ImagePipeline, ImgbbHost,
    JobStore, PipelineConfig, ReferenceImage,
};
use plateshot_db::{create_pool, DbPool, PgJobStore, PgRecipeSource, PgSettingsStore};

#[derive(Parser)]
#[command(name = "plateshot")]
#[command(about = "Recipe photo generation pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a photo for a recipe
    Generate {
        /// Recipe to illustrate
        #[arg(long)]
        recipe_id: Uuid,
        /// Custom prompt, bypassing the prompt builder
        #[arg(long)]
        prompt: Option<String>,
        /// Publicly reachable reference image URL
        #[arg(long, conflicts_with = "reference_file")]
        reference_url: Option<String>,
        /// Local reference image, published to the image host first
        #[arg(long)]
        reference_file: Option<PathBuf>,
        /// Directory the finished images get deposited into
        #[arg(long)]
        artifact_dir: Option<PathBuf>,
        /// Translate the prompt into this language before submission
        #[arg(long)]
        language: Option<String>,
    },
    /// Publish a local image to the public host and print its URL
    Upload {
        #[arg(long)]
        file: PathBuf,
    },
    /// Store generation credentials in the settings table
    SetCredentials {
        #[arg(long)]
        channel_id: String,
        #[arg(long)]
        auth_token: String,
    },
    /// Show the most recent generation job for a recipe
    JobStatus {
        #[arg(long)]
        recipe_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            recipe_id,
            prompt,
            reference_url,
            reference_file,
            artifact_dir,
            language,
        } => {
            generate(
                recipe_id,
                prompt,
                reference_url,
                reference_file,
                artifact_dir,
                language,
            )
            .await
        }
        Commands::Upload { file } => upload(file).await,
        Commands::SetCredentials {
            channel_id,
            auth_token,
        } => set_credentials(&channel_id, &auth_token),
        Commands::JobStatus { recipe_id } => job_status(recipe_id),
    }
}

fn pool() -> Result<Arc<DbPool>> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    Ok(Arc::new(create_pool(&database_url)))
}

async fn generate(
    recipe_id: Uuid,
    prompt: Option<String>,
    reference_url: Option<String>,
    reference_file: Option<PathBuf>,
    artifact_dir: Option<PathBuf>,
    language: Option<String>,
) -> Result<()> {
    let pool = pool()?;

    let mut config = PipelineConfig::default();
    if let Some(dir) = artifact_dir {
        config.artifact_dir = dir;
    }
    config.target_language = language;

    let mut pipeline = ImagePipeline::new(
        Arc::new(PgJobStore::new(pool.clone())),
        Arc::new(PgRecipeSource::new(pool.clone())),
        Arc::new(ChatClientFactory::from_env()),
        Arc::new(ImgbbHost::from_env()),
        config,
    )
    .with_settings(Arc::new(PgSettingsStore::new(pool)));

    match create_cached_provider_from_env() {
        Ok(provider) => pipeline = pipeline.with_translator(Arc::from(provider)),
        Err(e) => tracing::debug!("translation provider unavailable: {}", e),
    }

    let mut request = GenerateRequest::new(recipe_id);
    if let Some(prompt) = prompt {
        request = request.with_custom_prompt(prompt);
    }
    if let Some(url) = reference_url {
        request = request.with_reference_image(ReferenceImage::Url(url));
    } else if let Some(file) = reference_file {
        request = request.with_reference_image(ReferenceImage::Local(file));
    }

    let outcome = pipeline.generate(request).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.success {
        anyhow::bail!(
            "generation failed: {}",
            outcome.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    Ok(())
}

async fn upload(file: PathBuf) -> Result<()> {
    let host = ImgbbHost::from_env();
    let url = host
        .upload(&ImageSource::Path(file))
        .await
        .context("upload failed")?;
    println!("{}", url);
    Ok(())
}

fn set_credentials(channel_id: &str, auth_token: &str) -> Result<()> {
    let store = PgSettingsStore::new(pool()?);
    store
        .set(SETTING_CHANNEL_ID, channel_id)
        .context("failed to store channel id")?;
    store
        .set(SETTING_AUTH_TOKEN, auth_token)
        .context("failed to store auth token")?;
    println!("credentials stored");
    Ok(())
}

fn job_status(recipe_id: Uuid) -> Result<()> {
    let store = PgJobStore::new(pool()?);
    match store.latest_job(recipe_id)? {
        Some(job) => {
            println!("job:        {}", job.id);
            println!("status:     {}", job.status);
            if let Some(path) = &job.image_path {
                println!("image:      {}", path);
            }
            if let Some(error) = &job.error {
                println!("error:      {}", error);
            }
            println!("updated at: {}", job.updated_at);
        }
        None => println!("no jobs for recipe {}", recipe_id),
    }
    Ok(())
}
