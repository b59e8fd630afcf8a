pub mod db;
pub mod jobs;
pub mod models;
pub mod recipes;
pub mod schema;
pub mod settings;

pub use db::{create_pool, DbPool};
pub use jobs::PgJobStore;
pub use recipes::PgRecipeSource;
pub use settings::PgSettingsStore;
