//! Startup barrier that runs schema migrations exactly once per fleet.

use async_trait::async_trait;
use gantry_core::{Lock, Migrator, Result, Runner};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{error, info};

const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Blocks startup until this process holds the migration lock and has
/// migrated, then hands over to `next` for the rest of the process lifetime.
///
/// The lock stays held while `next` runs, so no other coordinator can start
/// migrating underneath a process that is already serving.
pub struct MigrationGate<R> {
    next: R,
    migrator: Arc<dyn Migrator>,
}

impl<R: Runner> MigrationGate<R> {
    pub fn new(next: R, migrator: Arc<dyn Migrator>) -> Self {
        Self { next, migrator }
    }
}

async fn acquire(migrator: &dyn Migrator) -> Result<Box<dyn Lock>> {
    loop {
        if let Some(lock) = migrator.acquire_migration_lock().await? {
            return Ok(lock);
        }
        info!("migration lock is held by another coordinator; waiting");
        tokio::time::sleep(RETRY_INTERVAL).await;
    }
}

async fn release(lock: Box<dyn Lock>) {
    if let Err(e) = lock.release().await {
        error!(error = %e, "failed to release migration lock");
    }
}

#[async_trait]
impl<R: Runner> Runner for MigrationGate<R> {
    async fn run(self, signals: watch::Receiver<bool>, ready: oneshot::Sender<()>) -> Result<()> {
        let MigrationGate { next, migrator } = self;
        let lock = acquire(migrator.as_ref()).await?;

        info!("acquired migration lock; migrating");
        if let Err(e) = migrator.migrate().await {
            release(lock).await;
            return Err(e);
        }
        info!("migrations complete");

        let result = next.run(signals, ready).await;
        release(lock).await;
        result
    }
}
