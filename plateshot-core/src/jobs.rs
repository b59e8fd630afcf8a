//! Image-generation job records and the store they live in.
//!
//! One row per generation attempt. Many rows may exist historically for a
//! recipe, but at most one may be non-terminal at any instant; the
//! `clear_unfinished`/`supersede_others` operations enforce that invariant
//! optimistically. Rows are never deleted here.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::filter::FilterChange;

/// Error message written to jobs failed out by a newer request.
pub const SUPERSEDED_REASON: &str = "Superseded by a newer generation request";

/// Error message when the remote service reported success but no artifact
/// could be correlated. Treated as failure rather than a completed job with
/// an unknown path.
pub const ARTIFACT_NOT_FOUND_REASON: &str = "Image file not found after generation";

/// Job lifecycle: `Pending -> Generating -> {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

impl JobStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Generating => "generating",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "generating" => Some(JobStatus::Generating),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted generation attempt.
#[derive(Debug, Clone)]
pub struct ImageJob {
    pub id: Uuid,
    pub recipe_id: Uuid,
    pub prompt: String,
    pub filter_changes: Vec<FilterChange>,
    pub correlation_id: Option<String>,
    pub image_path: Option<String>,
    pub status: JobStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Terminal state written by `finalize`.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub image_path: Option<String>,
    pub correlation_id: Option<String>,
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn completed(image_path: &str, correlation_id: &str) -> Self {
        Self {
            status: JobStatus::Completed,
            image_path: Some(image_path.to_string()),
            correlation_id: Some(correlation_id.to_string()),
            error: None,
        }
    }

    pub fn failed(error: &str, correlation_id: Option<&str>) -> Self {
        Self {
            status: JobStatus::Failed,
            image_path: None,
            correlation_id: correlation_id.map(str::to_string),
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid job state: {0}")]
    InvalidState(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Persistence operations for image jobs. All job-row mutation in the
/// pipeline goes through these five operations; no other component writes
/// job rows directly.
pub trait JobStore: Send + Sync {
    /// Fail out any `pending`/`generating` rows for the recipe, so a new
    /// request always wins over a stale unfinished one. Returns the number
    /// of rows affected.
    ///
    /// This and the subsequent `create` are two separate statements, so two
    /// back-to-back requests for the same recipe can race past each other.
    /// The sweep after every finalize bounds how long a duplicate stays
    /// visible as in-progress.
    fn clear_unfinished(&self, recipe_id: Uuid) -> Result<usize, JobStoreError>;

    /// Insert a new row at `pending`.
    fn create(
        &self,
        recipe_id: Uuid,
        prompt: &str,
        filter_changes: &[FilterChange],
    ) -> Result<Uuid, JobStoreError>;

    /// Transition `pending -> generating`. Errors if the row is missing or
    /// not in `pending`, to catch silent data-layer failures early.
    fn mark_generating(&self, job_id: Uuid) -> Result<(), JobStoreError>;

    /// Transition to a terminal state and verify the write. Finalizing a row
    /// that is already terminal is a logged no-op, so mis-ordered
    /// finalization attempts (artifact misattribution, superseding races)
    /// are tolerated.
    fn finalize(&self, job_id: Uuid, outcome: &JobOutcome) -> Result<(), JobStoreError>;

    /// Fail every other non-terminal row for the recipe with
    /// [`SUPERSEDED_REASON`]. Returns the number of rows affected.
    fn supersede_others(&self, recipe_id: Uuid, keep_job_id: Uuid) -> Result<usize, JobStoreError>;

    fn get(&self, job_id: Uuid) -> Result<ImageJob, JobStoreError>;

    /// The single non-terminal job for the recipe, if any. Backs the
    /// "is a generation in progress" question.
    fn active_job(&self, recipe_id: Uuid) -> Result<Option<ImageJob>, JobStoreError>;

    /// Most recently created job for the recipe, regardless of status.
    fn latest_job(&self, recipe_id: Uuid) -> Result<Option<ImageJob>, JobStoreError>;
}

/// In-memory job store for tests and dry runs.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    jobs: HashMap<Uuid, ImageJob>,
    // Insertion order; `created_at` ties are common in tests.
    order: Vec<Uuid>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every job, in creation order.
    pub fn all(&self) -> Vec<ImageJob> {
        let inner = self.inner.lock().unwrap();
        inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id).cloned())
            .collect()
    }

    /// Jobs for one recipe, in creation order.
    pub fn jobs_for(&self, recipe_id: Uuid) -> Vec<ImageJob> {
        self.all()
            .into_iter()
            .filter(|job| job.recipe_id == recipe_id)
            .collect()
    }
}

impl JobStore for MemoryJobStore {
    fn clear_unfinished(&self, recipe_id: Uuid) -> Result<usize, JobStoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut cleared = 0;
        for job in inner.jobs.values_mut() {
            if job.recipe_id == recipe_id && !job.status.is_terminal() {
                job.status = JobStatus::Failed;
                job.error = Some(SUPERSEDED_REASON.to_string());
                job.updated_at = Utc::now();
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    fn create(
        &self,
        recipe_id: Uuid,
        prompt: &str,
        filter_changes: &[FilterChange],
    ) -> Result<Uuid, JobStoreError> {
        let mut inner = self.inner.lock().unwrap();
        let id = Uuid::new_v4();
        let now = Utc::now();
        inner.jobs.insert(
            id,
            ImageJob {
                id,
                recipe_id,
                prompt: prompt.to_string(),
                filter_changes: filter_changes.to_vec(),
                correlation_id: None,
                image_path: None,
                status: JobStatus::Pending,
                error: None,
                created_at: now,
                updated_at: now,
            },
        );
        inner.order.push(id);
        Ok(id)
    }

    fn mark_generating(&self, job_id: Uuid) -> Result<(), JobStoreError> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or(JobStoreError::NotFound(job_id))?;
        if job.status != JobStatus::Pending {
            return Err(JobStoreError::InvalidState(format!(
                "expected pending, found {}",
                job.status
            )));
        }
        job.status = JobStatus::Generating;
        job.updated_at = Utc::now();
        Ok(())
    }

    fn finalize(&self, job_id: Uuid, outcome: &JobOutcome) -> Result<(), JobStoreError> {
        if !outcome.status.is_terminal() {
            return Err(JobStoreError::InvalidState(format!(
                "finalize target must be terminal, got {}",
                outcome.status
            )));
        }
        let mut inner = self.inner.lock().unwrap();
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or(JobStoreError::NotFound(job_id))?;
        if job.status.is_terminal() {
            tracing::debug!(job_id = %job_id, status = %job.status, "job already finalized");
            return Ok(());
        }
        job.status = outcome.status;
        job.image_path = outcome.image_path.clone();
        job.correlation_id = outcome.correlation_id.clone();
        job.error = outcome.error.clone();
        job.updated_at = Utc::now();
        Ok(())
    }

    fn supersede_others(&self, recipe_id: Uuid, keep_job_id: Uuid) -> Result<usize, JobStoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut swept = 0;
        for job in inner.jobs.values_mut() {
            if job.recipe_id == recipe_id && job.id != keep_job_id && !job.status.is_terminal() {
                job.status = JobStatus::Failed;
                job.error = Some(SUPERSEDED_REASON.to_string());
                job.updated_at = Utc::now();
                swept += 1;
            }
        }
        Ok(swept)
    }

    fn get(&self, job_id: Uuid) -> Result<ImageJob, JobStoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or(JobStoreError::NotFound(job_id))
    }

    fn active_job(&self, recipe_id: Uuid) -> Result<Option<ImageJob>, JobStoreError> {
        Ok(self
            .jobs_for(recipe_id)
            .into_iter()
            .rev()
            .find(|job| !job.status.is_terminal()))
    }

    fn latest_job(&self, recipe_id: Uuid) -> Result<Option<ImageJob>, JobStoreError> {
        Ok(self.jobs_for(recipe_id).into_iter().last())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Generating,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("unknown"), None);
    }

    #[test]
    fn test_clear_unfinished_fails_out_stale_rows() {
        let store = MemoryJobStore::new();
        let recipe_id = Uuid::new_v4();
        let stale = store.create(recipe_id, "old prompt", &[]).unwrap();
        store.mark_generating(stale).unwrap();

        let cleared = store.clear_unfinished(recipe_id).unwrap();
        assert_eq!(cleared, 1);

        let job = store.get(stale).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some(SUPERSEDED_REASON));
    }

    #[test]
    fn test_mark_generating_requires_pending() {
        let store = MemoryJobStore::new();
        let recipe_id = Uuid::new_v4();
        let id = store.create(recipe_id, "prompt", &[]).unwrap();
        store.mark_generating(id).unwrap();

        let err = store.mark_generating(id).unwrap_err();
        assert!(matches!(err, JobStoreError::InvalidState(_)));

        let err = store.mark_generating(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, JobStoreError::NotFound(_)));
    }

    #[test]
    fn test_finalize_is_idempotent_on_terminal_rows() {
        let store = MemoryJobStore::new();
        let recipe_id = Uuid::new_v4();
        let id = store.create(recipe_id, "prompt", &[]).unwrap();
        store.mark_generating(id).unwrap();
        store
            .finalize(id, &JobOutcome::completed("grid_1.jpg", "corr-1"))
            .unwrap();

        // A late failure report must not clobber the completed row.
        store
            .finalize(id, &JobOutcome::failed("late failure", None))
            .unwrap();

        let job = store.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.image_path.as_deref(), Some("grid_1.jpg"));
    }

    #[test]
    fn test_finalize_rejects_non_terminal_target() {
        let store = MemoryJobStore::new();
        let id = store.create(Uuid::new_v4(), "prompt", &[]).unwrap();
        let outcome = JobOutcome {
            status: JobStatus::Generating,
            image_path: None,
            correlation_id: None,
            error: None,
        };
        assert!(store.finalize(id, &outcome).is_err());
    }

    #[test]
    fn test_supersede_others_keeps_the_winner() {
        let store = MemoryJobStore::new();
        let recipe_id = Uuid::new_v4();
        let loser = store.create(recipe_id, "first", &[]).unwrap();
        store.mark_generating(loser).unwrap();
        let winner = store.create(recipe_id, "second", &[]).unwrap();

        let swept = store.supersede_others(recipe_id, winner).unwrap();
        assert_eq!(swept, 1);
        assert_eq!(store.get(loser).unwrap().status, JobStatus::Failed);
        assert_eq!(store.get(winner).unwrap().status, JobStatus::Pending);
    }

    #[test]
    fn test_active_job_reports_non_terminal_only() {
        let store = MemoryJobStore::new();
        let recipe_id = Uuid::new_v4();
        assert!(store.active_job(recipe_id).unwrap().is_none());

        let id = store.create(recipe_id, "prompt", &[]).unwrap();
        assert_eq!(store.active_job(recipe_id).unwrap().unwrap().id, id);

        store
            .finalize(id, &JobOutcome::failed("boom", None))
            .unwrap();
        assert!(store.active_job(recipe_id).unwrap().is_none());
    }
}
