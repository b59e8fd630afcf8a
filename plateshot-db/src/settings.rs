//! Persisted key-value settings.
//!
//! Reads implement the resolver-facing [`SettingsStore`]; lookup failures
//! are logged and reported as absent so the credential chain can fall
//! through to the next source.

use std::sync::Arc;

use chrono::Utc;
use diesel::prelude::*;
use thiserror::Error;

use plateshot_core::credentials::SettingsStore;

use crate::db::DbPool;
use crate::models::NewSetting;
use crate::schema::settings;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Database error: {0}")]
    Database(String),
}

pub struct PgSettingsStore {
    pool: Arc<DbPool>,
}

impl PgSettingsStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    /// Upsert a setting.
    pub fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        let mut conn = self
            .pool
            .get()
            .map_err(|e| SettingsError::Database(e.to_string()))?;

        diesel::insert_into(settings::table)
            .values(&NewSetting { key, value })
            .on_conflict(settings::key)
            .do_update()
            .set((
                settings::value.eq(value),
                settings::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .map_err(|e| SettingsError::Database(e.to_string()))?;

        Ok(())
    }
}

impl SettingsStore for PgSettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        let mut conn = match self.pool.get() {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(key = key, error = %e, "settings lookup failed");
                return None;
            }
        };

        match settings::table
            .find(key)
            .select(settings::value)
            .first::<String>(&mut conn)
            .optional()
        {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = key, error = %e, "settings lookup failed");
                None
            }
        }
    }
}
