//! PostgreSQL-backed persistence adapter for the CAT engine.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub mod ability_repository;
pub mod catalogue_repository;
pub mod error;
pub mod rule_repository;
pub mod session_repository;

pub use ability_repository::AbilityRepository;
pub use catalogue_repository::CatalogueRepository;
pub use error::StorageError;
pub use rule_repository::RuleRepositoryPg;
pub use session_repository::SessionRepositoryPg;

/// Create a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool, StorageError> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(StorageError::Connection)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(StorageError::Migration)
}

/// Check database connectivity.
pub async fn check_connection(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(StorageError::Query)?;
    Ok(())
}
