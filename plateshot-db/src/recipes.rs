//! Diesel-backed, read-only recipe access for the pipeline.

use std::sync::Arc;

use diesel::prelude::*;
use uuid::Uuid;

use plateshot_core::recipes::{RecipeContent, RecipeSource, RecipeSourceError};

use crate::db::DbPool;
use crate::models::RecipeRow;
use crate::schema::recipes;

pub struct PgRecipeSource {
    pool: Arc<DbPool>,
}

impl PgRecipeSource {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

impl RecipeSource for PgRecipeSource {
    fn get_content(&self, recipe_id: Uuid) -> Result<Option<RecipeContent>, RecipeSourceError> {
        let mut conn = self
            .pool
            .get()
            .map_err(|e| RecipeSourceError::Database(e.to_string()))?;

        let row = recipes::table
            .find(recipe_id)
            .first::<RecipeRow>(&mut conn)
            .optional()
            .map_err(|e| RecipeSourceError::Database(e.to_string()))?;

        Ok(row.map(|row| RecipeContent {
            id: row.id,
            title: row.title,
            ingredients: Some(row.ingredients),
        }))
    }
}
