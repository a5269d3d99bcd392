//! Schema migrations gated by the fleet-wide migration lock.

use async_trait::async_trait;
use gantry_core::{Lock, LockFactory, LockId, Migrator, Result};
use sqlx::PgPool;
use tracing::info;

use crate::{DbError, PgLockFactory};

/// Runs the embedded migrations under `migrations/`.
pub struct PgMigrator {
    pool: PgPool,
    locks: PgLockFactory,
}

impl PgMigrator {
    pub fn new(pool: PgPool, locks: PgLockFactory) -> Self {
        Self { pool, locks }
    }
}

#[async_trait]
impl Migrator for PgMigrator {
    async fn acquire_migration_lock(&self) -> Result<Option<Box<dyn Lock>>> {
        self.locks.acquire(LockId::database_migration()).await
    }

    async fn migrate(&self) -> Result<()> {
        let mut migrator = sqlx::migrate!("./migrations");
        // Exclusivity comes from the migration lock held by the caller.
        migrator.set_locking(false);

        info!(
            migrations = migrator.iter().count(),
            "running database migrations"
        );
        migrator.run(&self.pool).await.map_err(DbError::from)?;
        Ok(())
    }
}
