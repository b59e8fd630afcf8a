//! End-to-end pipeline scenarios against the in-memory fakes.

use std::sync::Arc;
use std::time::Duration;

use plateshot_core::credentials::MemorySettings;
use plateshot_core::jobs::{JobStatus, SUPERSEDED_REASON, ARTIFACT_NOT_FOUND_REASON};
use plateshot_core::{
    FakeGenerationClient, GenCredentials, GenerateRequest, ImagePipeline, JobStore,
    MemoryJobStore, MemoryRecipeSource, MockImageHost, PipelineConfig, RecipeContent,
    ReferenceImage,
};
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

struct Harness {
    jobs: Arc<MemoryJobStore>,
    client: FakeGenerationClient,
    pipeline: ImagePipeline,
    recipe_id: Uuid,
    _artifact_dir: TempDir,
}

fn harness(client: FakeGenerationClient) -> Harness {
    harness_with_host(client, MockImageHost::with_url("https://img.example/ref.png"))
}

fn harness_with_host(client: FakeGenerationClient, host: MockImageHost) -> Harness {
    let jobs = Arc::new(MemoryJobStore::new());
    let recipes = Arc::new(MemoryRecipeSource::new());
    let recipe_id = Uuid::new_v4();
    recipes.insert(RecipeContent {
        id: recipe_id,
        title: "Tomato Galette".to_string(),
        ingredients: Some(json!([
            {"item": "tomatoes"},
            {"item": "pastry dough"},
            {"item": "goat cheese"},
        ])),
    });

    let artifact_dir = TempDir::new().unwrap();
    let config = PipelineConfig {
        artifact_dir: artifact_dir.path().to_path_buf(),
        recency_window: Duration::from_secs(300),
        pacing_ms: 0..=0,
        ..PipelineConfig::default()
    };

    let pipeline = ImagePipeline::new(
        jobs.clone(),
        recipes,
        Arc::new(client.clone()),
        Arc::new(host),
        config,
    );

    Harness {
        jobs,
        client,
        pipeline,
        recipe_id,
        _artifact_dir: artifact_dir,
    }
}

fn request(h: &Harness) -> GenerateRequest {
    GenerateRequest::new(h.recipe_id)
        .with_credentials(GenCredentials::new("channel-1", "token-1"))
}

#[tokio::test]
async fn test_successful_generation_completes_the_job() {
    let h = harness(FakeGenerationClient::new().with_direct_artifact("grid_x.jpg"));

    let outcome = h.pipeline.generate(request(&h)).await;

    assert!(outcome.success, "outcome: {:?}", outcome);
    assert_eq!(outcome.image_path.as_deref(), Some("grid_x.jpg"));

    let job = h.jobs.get(outcome.job_id.unwrap()).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.image_path.as_deref(), Some("grid_x.jpg"));
    assert!(job.correlation_id.is_some());
    assert!(job.error.is_none());
}

#[tokio::test]
async fn test_filter_rejection_never_reaches_the_service() {
    let h = harness(FakeGenerationClient::new());

    let outcome = h
        .pipeline
        .generate(request(&h).with_custom_prompt("some nsfw thing"))
        .await;

    assert!(!outcome.success);
    let error = outcome.error.unwrap();
    assert!(error.contains("nsfw"), "error: {}", error);
    assert_eq!(h.client.submission_count(), 0);

    let job = h.jobs.get(outcome.job_id.unwrap()).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("nsfw"));
}

#[tokio::test]
async fn test_regenerate_supersedes_the_stale_job() {
    let h = harness(
        FakeGenerationClient::new()
            .with_direct_artifact("grid_1.jpg")
            .with_direct_artifact("grid_2.jpg"),
    );

    // A previous request left its job mid-flight.
    let stale = h.jobs.create(h.recipe_id, "old prompt", &[]).unwrap();
    h.jobs.mark_generating(stale).unwrap();

    let outcome = h.pipeline.generate(request(&h)).await;
    assert!(outcome.success);

    let stale_job = h.jobs.get(stale).unwrap();
    assert_eq!(stale_job.status, JobStatus::Failed);
    assert_eq!(stale_job.error.as_deref(), Some(SUPERSEDED_REASON));

    // Single-flight: nothing non-terminal remains.
    assert!(h.jobs.active_job(h.recipe_id).unwrap().is_none());
}

#[tokio::test]
async fn test_two_sequential_requests_leave_one_winner() {
    let h = harness(
        FakeGenerationClient::new()
            .with_direct_artifact("grid_1.jpg")
            .with_direct_artifact("grid_2.jpg"),
    );

    let first = h.pipeline.generate(request(&h)).await;
    let second = h.pipeline.generate(request(&h)).await;
    assert!(first.success && second.success);

    let jobs = h.jobs.jobs_for(h.recipe_id);
    assert_eq!(jobs.len(), 2);
    for job in &jobs {
        assert!(job.status.is_terminal());
    }
    // Each job kept its own outcome; the first was already terminal when
    // the second ran, so the sweep left it alone.
    assert_eq!(jobs[0].image_path.as_deref(), Some("grid_1.jpg"));
    assert_eq!(jobs[1].image_path.as_deref(), Some("grid_2.jpg"));
}

#[tokio::test]
async fn test_missing_credentials_creates_no_job() {
    let h = harness(FakeGenerationClient::new());

    let outcome = h.pipeline.generate(GenerateRequest::new(h.recipe_id)).await;

    assert!(!outcome.success);
    assert!(outcome.job_id.is_none());
    let error = outcome.error.unwrap();
    assert!(error.contains("PLATESHOT_GEN_CHANNEL_ID"), "error: {}", error);
    assert_eq!(h.client.submission_count(), 0);
    assert!(h.jobs.all().is_empty());
}

#[tokio::test]
async fn test_settings_store_satisfies_credentials() {
    let h = harness(FakeGenerationClient::new().with_direct_artifact("grid_s.jpg"));

    let settings = MemorySettings::new();
    settings.set("gen.channel_id", "channel-db");
    settings.set("gen.auth_token", "token-db");

    // Rebuild the pipeline with a settings store and no request override.
    let recipes = Arc::new(MemoryRecipeSource::new());
    recipes.insert(RecipeContent {
        id: h.recipe_id,
        title: "Tomato Galette".to_string(),
        ingredients: None,
    });
    let pipeline = ImagePipeline::new(
        h.jobs.clone(),
        recipes,
        Arc::new(h.client.clone()),
        Arc::new(MockImageHost::with_url("https://img.example/ref.png")),
        PipelineConfig {
            pacing_ms: 0..=0,
            ..PipelineConfig::default()
        },
    )
    .with_settings(Arc::new(settings));

    let outcome = pipeline.generate(GenerateRequest::new(h.recipe_id)).await;
    assert!(outcome.success, "outcome: {:?}", outcome);
}

#[tokio::test]
async fn test_generation_failure_finalizes_the_job() {
    let h = harness(FakeGenerationClient::new().with_failure("remote exploded"));

    let outcome = h.pipeline.generate(request(&h)).await;

    assert!(!outcome.success);
    let job = h.jobs.get(outcome.job_id.unwrap()).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("remote exploded"));
    assert!(h.jobs.active_job(h.recipe_id).unwrap().is_none());
}

#[tokio::test]
async fn test_unlocatable_artifact_fails_conservatively() {
    // Correlation-only result and an empty artifact directory.
    let h = harness(FakeGenerationClient::new().with_correlation_only("corr-77"));

    let outcome = h.pipeline.generate(request(&h)).await;

    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains(ARTIFACT_NOT_FOUND_REASON));

    let job = h.jobs.get(outcome.job_id.unwrap()).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    // The correlation id is still recorded for later inspection.
    assert_eq!(job.correlation_id.as_deref(), Some("corr-77"));
}

#[tokio::test]
async fn test_reference_image_is_published_and_leads_the_prompt() {
    let h = harness_with_host(
        FakeGenerationClient::new().with_direct_artifact("grid_r.jpg"),
        MockImageHost::with_url("https://img.example/cropped.png"),
    );

    let outcome = h
        .pipeline
        .generate(request(&h).with_reference_image(ReferenceImage::Inline("aGk=".to_string())))
        .await;

    assert!(outcome.success);
    let submitted = h.client.submissions();
    assert_eq!(submitted.len(), 1);
    assert!(
        submitted[0].starts_with("https://img.example/cropped.png "),
        "submitted: {}",
        submitted[0]
    );
}

#[tokio::test]
async fn test_reference_upload_failure_degrades_gracefully() {
    let h = harness_with_host(
        FakeGenerationClient::new().with_direct_artifact("grid_d.jpg"),
        MockImageHost::failing("host down"),
    );

    let outcome = h
        .pipeline
        .generate(request(&h).with_reference_image(ReferenceImage::Inline("aGk=".to_string())))
        .await;

    // The job still succeeds, just without the reference.
    assert!(outcome.success);
    let submitted = h.client.submissions();
    assert!(!submitted[0].starts_with("http"), "submitted: {}", submitted[0]);
}

#[tokio::test]
async fn test_custom_prompt_bypasses_builder_but_not_filter() {
    let h = harness(FakeGenerationClient::new().with_direct_artifact("grid_c.jpg"));

    let outcome = h
        .pipeline
        .generate(request(&h).with_custom_prompt("grilled chicken breast close up"))
        .await;

    assert!(outcome.success);
    let job = h.jobs.get(outcome.job_id.unwrap()).unwrap();
    // The filter still ran: "breast" was rewritten and logged.
    assert!(job.prompt.contains("fillet"));
    assert_eq!(job.filter_changes.len(), 1);
    assert!(!job.prompt.contains("Tomato Galette"));
}

#[tokio::test]
async fn test_each_job_gets_its_own_client() {
    let h = harness(
        FakeGenerationClient::new()
            .with_direct_artifact("grid_1.jpg")
            .with_direct_artifact("grid_2.jpg"),
    );

    h.pipeline.generate(request(&h)).await;
    h.pipeline.generate(request(&h)).await;

    assert_eq!(h.client.clients_created(), 2);
}
