//! Dispatch of pending builds through admission control.

use crate::admission::AdmissionController;
use async_trait::async_trait;
use gantry_core::{Job, JobRepository, Result, Task};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Starts a job's pending builds in order until admission control says stop.
pub struct BuildStarter {
    admission: Arc<AdmissionController>,
}

impl BuildStarter {
    pub fn new(admission: Arc<AdmissionController>) -> Self {
        Self { admission }
    }

    /// Returns how many builds this call scheduled.
    pub async fn try_start_pending_builds(&self, job: &dyn Job) -> Result<usize> {
        let pending = job.pending_builds().await?;
        let mut started = 0;

        for build in pending {
            let reached = self
                .admission
                .update_max_in_flight_reached(job, build.id)
                .await?;
            if reached {
                break;
            }

            if !job.schedule_build(build.id).await? {
                debug!(
                    pipeline = job.pipeline(),
                    job = job.name(),
                    build_id = build.id,
                    "build was scheduled elsewhere"
                );
                break;
            }

            info!(
                pipeline = job.pipeline(),
                job = job.name(),
                build_id = build.id,
                "scheduled build"
            );
            started += 1;
        }

        Ok(started)
    }
}

/// Task behind the `scheduler` component.
pub struct SchedulingTask {
    jobs: Arc<dyn JobRepository>,
    starter: BuildStarter,
}

impl SchedulingTask {
    pub fn new(jobs: Arc<dyn JobRepository>, starter: BuildStarter) -> Self {
        Self { jobs, starter }
    }
}

#[async_trait]
impl Task for SchedulingTask {
    async fn run(&self) -> Result<()> {
        let jobs = self.jobs.jobs().await?;

        for job in &jobs {
            if let Err(e) = self.starter.try_start_pending_builds(job.as_ref()).await {
                error!(
                    pipeline = job.pipeline(),
                    job = job.name(),
                    error = %e,
                    "failed to start pending builds"
                );
            }
        }
        Ok(())
    }
}
