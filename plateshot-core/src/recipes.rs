//! Read-only access to the recipe rows the pipeline illustrates.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;
use uuid::Uuid;

/// The slice of a recipe the pipeline needs: a title and whatever ingredient
/// JSON the recipe carries. Ingredient data is optional and may be malformed;
/// the prompt builder degrades rather than erroring.
#[derive(Debug, Clone)]
pub struct RecipeContent {
    pub id: Uuid,
    pub title: String,
    pub ingredients: Option<serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum RecipeSourceError {
    #[error("Database error: {0}")]
    Database(String),
}

pub trait RecipeSource: Send + Sync {
    fn get_content(&self, recipe_id: Uuid) -> Result<Option<RecipeContent>, RecipeSourceError>;
}

/// In-memory recipe source for tests.
#[derive(Default)]
pub struct MemoryRecipeSource {
    recipes: Mutex<HashMap<Uuid, RecipeContent>>,
}

impl MemoryRecipeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, recipe: RecipeContent) {
        self.recipes.lock().unwrap().insert(recipe.id, recipe);
    }
}

impl RecipeSource for MemoryRecipeSource {
    fn get_content(&self, recipe_id: Uuid) -> Result<Option<RecipeContent>, RecipeSourceError> {
        Ok(self.recipes.lock().unwrap().get(&recipe_id).cloned())
    }
}
