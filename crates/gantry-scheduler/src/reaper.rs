//! Build event retention.

use async_trait::async_trait;
use gantry_core::{BuildLogStore, Result, Task};
use std::sync::Arc;
use tracing::{debug, info};

/// Task behind the `build-reaper` component. Deletes the event logs of
/// finished builds that fall outside their job's retention, oldest first,
/// reaping at most `batch_size` builds per run.
pub struct BuildReaper {
    store: Arc<dyn BuildLogStore>,
    batch_size: usize,
}

impl BuildReaper {
    pub fn new(store: Arc<dyn BuildLogStore>, batch_size: usize) -> Self {
        Self { store, batch_size }
    }
}

#[async_trait]
impl Task for BuildReaper {
    async fn run(&self) -> Result<()> {
        let mut budget = self.batch_size;

        for policy in self.store.retention_policies().await? {
            if budget == 0 {
                debug!("reap batch exhausted");
                break;
            }

            let builds = self.store.reapable_builds(&policy, budget).await?;
            if builds.is_empty() {
                continue;
            }

            self.store.delete_build_events(&builds).await?;
            budget = budget.saturating_sub(builds.len());

            info!(
                job = %policy.job_name,
                retain = policy.builds_to_retain,
                reaped = builds.len(),
                "reaped build logs"
            );
        }
        Ok(())
    }
}
