//! Process-level runner that drives all lock runners.

use crate::lock_runner::LockRunner;
use async_trait::async_trait;
use gantry_core::{Result, Runner};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Spawns one task per lock runner and reports ready. On shutdown, waits
/// for every runner to finish its current tick.
pub struct Coordinator {
    runners: Vec<LockRunner>,
}

impl Coordinator {
    pub fn new(runners: Vec<LockRunner>) -> Self {
        Self { runners }
    }
}

#[async_trait]
impl Runner for Coordinator {
    async fn run(self, mut signals: watch::Receiver<bool>, ready: oneshot::Sender<()>) -> Result<()> {
        let mut tasks = JoinSet::new();
        for runner in self.runners {
            info!(component = runner.component(), "starting component");
            tasks.spawn(runner.run(signals.clone()));
        }

        if ready.send(()).is_err() {
            debug!("nobody is waiting for coordinator readiness");
        }

        while !*signals.borrow() {
            if signals.changed().await.is_err() {
                break;
            }
        }
        info!("shutting down components");

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "lock runner task failed");
            }
        }

        info!("all components stopped");
        Ok(())
    }
}
