//! PostgreSQL collaborators for the Gantry coordinator.
//!
//! Provides advisory locks, component metadata, job/build/worker queries
//! and the schema migrator, all backed by one shared database.

pub mod error;
pub mod repo;

pub use error::{DbError, DbResult};
pub use repo::*;

use gantry_config::DatabaseConfig;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str, config: &DatabaseConfig) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}
