//! Units of work driven by the scheduler.

use async_trait::async_trait;
use tokio::sync::{oneshot, watch};

use crate::{Lock, Result};

/// A unit of periodic work, run under a fleet-wide lock.
#[async_trait]
pub trait Task: Send + Sync {
    async fn run(&self) -> Result<()>;
}

/// A long-lived process entry point.
///
/// `signals` flips to `true` when the process should shut down; `ready` is
/// sent once the runner has started serving.
#[async_trait]
pub trait Runner: Send {
    async fn run(self, signals: watch::Receiver<bool>, ready: oneshot::Sender<()>) -> Result<()>;
}

/// Performs schema migrations under the fleet-wide migration lock.
#[async_trait]
pub trait Migrator: Send + Sync {
    /// Try to take the migration lock without waiting.
    async fn acquire_migration_lock(&self) -> Result<Option<Box<dyn Lock>>>;

    async fn migrate(&self) -> Result<()>;
}
