use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use plateshot_core::jobs::{ImageJob, JobStatus, JobStoreError};

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = crate::schema::image_jobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ImageJobRow {
    pub id: Uuid,
    pub recipe_id: Uuid,
    pub prompt: String,
    pub filter_changes: serde_json::Value,
    pub correlation_id: Option<String>,
    pub image_path: Option<String>,
    pub status: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ImageJobRow> for ImageJob {
    type Error = JobStoreError;

    fn try_from(row: ImageJobRow) -> Result<Self, Self::Error> {
        let status = JobStatus::parse(&row.status).ok_or_else(|| {
            JobStoreError::InvalidState(format!("unknown status in row {}: {}", row.id, row.status))
        })?;

        // A malformed change log is not worth failing a read over.
        let filter_changes = serde_json::from_value(row.filter_changes).unwrap_or_else(|e| {
            tracing::warn!(job_id = %row.id, error = %e, "unreadable filter_changes, ignoring");
            Vec::new()
        });

        Ok(ImageJob {
            id: row.id,
            recipe_id: row.recipe_id,
            prompt: row.prompt,
            filter_changes,
            correlation_id: row.correlation_id,
            image_path: row.image_path,
            status,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::image_jobs)]
pub struct NewImageJob<'a> {
    pub recipe_id: Uuid,
    pub prompt: &'a str,
    pub filter_changes: serde_json::Value,
    pub status: &'a str,
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = crate::schema::recipes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RecipeRow {
    pub id: Uuid,
    pub title: String,
    pub ingredients: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = crate::schema::settings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SettingRow {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::settings)]
pub struct NewSetting<'a> {
    pub key: &'a str,
    pub value: &'a str,
}
