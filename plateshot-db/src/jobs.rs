//! Diesel-backed job store.
//!
//! Queries are synchronous r2d2/Diesel calls made from within the async
//! pipeline task, the same way the rest of the application talks to
//! Postgres. All writes re-check their effect: transition operations verify
//! affected-row counts, and finalize re-reads the row it wrote.

use std::sync::Arc;

use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use plateshot_core::filter::FilterChange;
use plateshot_core::jobs::{
    ImageJob, JobOutcome, JobStatus, JobStore, JobStoreError, SUPERSEDED_REASON,
};

use crate::db::DbPool;
use crate::models::{ImageJobRow, NewImageJob};
use crate::schema::image_jobs;

pub struct PgJobStore {
    pool: Arc<DbPool>,
}

impl PgJobStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    fn conn(
        &self,
    ) -> Result<
        diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<PgConnection>>,
        JobStoreError,
    > {
        self.pool
            .get()
            .map_err(|e| JobStoreError::Database(e.to_string()))
    }

    fn load(&self, job_id: Uuid) -> Result<ImageJob, JobStoreError> {
        let mut conn = self.conn()?;
        let row = image_jobs::table
            .find(job_id)
            .first::<ImageJobRow>(&mut conn)
            .optional()
            .map_err(|e| JobStoreError::Database(e.to_string()))?
            .ok_or(JobStoreError::NotFound(job_id))?;
        row.try_into()
    }
}

const UNFINISHED: [&str; 2] = [
    JobStatus::Pending.as_str(),
    JobStatus::Generating.as_str(),
];

impl JobStore for PgJobStore {
    fn clear_unfinished(&self, recipe_id: Uuid) -> Result<usize, JobStoreError> {
        let mut conn = self.conn()?;
        diesel::update(
            image_jobs::table
                .filter(image_jobs::recipe_id.eq(recipe_id))
                .filter(image_jobs::status.eq_any(UNFINISHED)),
        )
        .set((
            image_jobs::status.eq(JobStatus::Failed.as_str()),
            image_jobs::error.eq(SUPERSEDED_REASON),
            image_jobs::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)
        .map_err(|e| JobStoreError::Database(e.to_string()))
    }

    fn create(
        &self,
        recipe_id: Uuid,
        prompt: &str,
        filter_changes: &[FilterChange],
    ) -> Result<Uuid, JobStoreError> {
        let mut conn = self.conn()?;
        let changes = serde_json::to_value(filter_changes)
            .map_err(|e| JobStoreError::Database(e.to_string()))?;

        let new_job = NewImageJob {
            recipe_id,
            prompt,
            filter_changes: changes,
            status: JobStatus::Pending.as_str(),
        };

        diesel::insert_into(image_jobs::table)
            .values(&new_job)
            .returning(image_jobs::id)
            .get_result(&mut conn)
            .map_err(|e| JobStoreError::Database(e.to_string()))
    }

    fn mark_generating(&self, job_id: Uuid) -> Result<(), JobStoreError> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            image_jobs::table
                .find(job_id)
                .filter(image_jobs::status.eq(JobStatus::Pending.as_str())),
        )
        .set((
            image_jobs::status.eq(JobStatus::Generating.as_str()),
            image_jobs::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)
        .map_err(|e| JobStoreError::Database(e.to_string()))?;

        if updated == 1 {
            return Ok(());
        }

        // Nothing matched: either the row vanished or it is not pending.
        // Distinguish so the failure reads correctly in logs.
        drop(conn);
        let job = self.load(job_id)?;
        Err(JobStoreError::InvalidState(format!(
            "expected pending, found {}",
            job.status
        )))
    }

    fn finalize(&self, job_id: Uuid, outcome: &JobOutcome) -> Result<(), JobStoreError> {
        if !outcome.status.is_terminal() {
            return Err(JobStoreError::InvalidState(format!(
                "finalize target must be terminal, got {}",
                outcome.status
            )));
        }

        let current = self.load(job_id)?;
        if current.status.is_terminal() {
            // Tolerated: artifact misattribution and superseding races can
            // both produce a second finalize attempt.
            tracing::debug!(job_id = %job_id, status = %current.status, "job already finalized");
            return Ok(());
        }

        let mut conn = self.conn()?;
        diesel::update(image_jobs::table.find(job_id))
            .set((
                image_jobs::status.eq(outcome.status.as_str()),
                image_jobs::image_path.eq(outcome.image_path.as_deref()),
                image_jobs::correlation_id.eq(outcome.correlation_id.as_deref()),
                image_jobs::error.eq(outcome.error.as_deref()),
                image_jobs::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .map_err(|e| JobStoreError::Database(e.to_string()))?;
        drop(conn);

        // Verify the write actually landed; a silently dropped update would
        // otherwise leave the job visible as in-progress forever.
        let written = self.load(job_id)?;
        if written.status != outcome.status {
            return Err(JobStoreError::Database(format!(
                "finalize verification failed for {}: wrote {}, read back {}",
                job_id, outcome.status, written.status
            )));
        }

        Ok(())
    }

    fn supersede_others(&self, recipe_id: Uuid, keep_job_id: Uuid) -> Result<usize, JobStoreError> {
        let mut conn = self.conn()?;
        diesel::update(
            image_jobs::table
                .filter(image_jobs::recipe_id.eq(recipe_id))
                .filter(image_jobs::id.ne(keep_job_id))
                .filter(image_jobs::status.eq_any(UNFINISHED)),
        )
        .set((
            image_jobs::status.eq(JobStatus::Failed.as_str()),
            image_jobs::error.eq(SUPERSEDED_REASON),
            image_jobs::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)
        .map_err(|e| JobStoreError::Database(e.to_string()))
    }

    fn get(&self, job_id: Uuid) -> Result<ImageJob, JobStoreError> {
        self.load(job_id)
    }

    fn active_job(&self, recipe_id: Uuid) -> Result<Option<ImageJob>, JobStoreError> {
        let mut conn = self.conn()?;
        let row = image_jobs::table
            .filter(image_jobs::recipe_id.eq(recipe_id))
            .filter(image_jobs::status.eq_any(UNFINISHED))
            .order(image_jobs::created_at.desc())
            .first::<ImageJobRow>(&mut conn)
            .optional()
            .map_err(|e| JobStoreError::Database(e.to_string()))?;
        row.map(ImageJob::try_from).transpose()
    }

    fn latest_job(&self, recipe_id: Uuid) -> Result<Option<ImageJob>, JobStoreError> {
        let mut conn = self.conn()?;
        let row = image_jobs::table
            .filter(image_jobs::recipe_id.eq(recipe_id))
            .order(image_jobs::created_at.desc())
            .first::<ImageJobRow>(&mut conn)
            .optional()
            .map_err(|e| JobStoreError::Database(e.to_string()))?;
        row.map(ImageJob::try_from).transpose()
    }
}
