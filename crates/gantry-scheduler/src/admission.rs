//! Admission control for pending builds.
//!
//! Decides whether starting a candidate build would exceed cluster container
//! capacity or the job's max-in-flight limit, and records the outcome on the
//! job as its advisory "max in flight reached" flag.
//!
//! The decision is a read-then-write over shared state and is not atomic
//! with respect to other coordinators evaluating builds of the same serial
//! group. Two coordinators can both admit different builds in a narrow race
//! window; the build-start path must serialize actual dispatch if it needs a
//! hard guarantee.

use gantry_config::AdmissionConfig;
use gantry_core::{Job, WorkerInventory};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Cluster-wide container capacity limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacityLimits {
    pub per_worker_containers: u32,
    pub safety_fraction: f64,
}

impl Default for CapacityLimits {
    fn default() -> Self {
        Self {
            per_worker_containers: 250,
            safety_fraction: 0.9,
        }
    }
}

impl From<&AdmissionConfig> for CapacityLimits {
    fn from(config: &AdmissionConfig) -> Self {
        Self {
            per_worker_containers: config.per_worker_containers,
            safety_fraction: config.safety_fraction,
        }
    }
}

impl CapacityLimits {
    /// Containers the cluster may run before it counts as saturated.
    pub fn safe_capacity(&self, workers: usize) -> u64 {
        let total = workers as f64 * f64::from(self.per_worker_containers);
        (total * self.safety_fraction).floor() as u64
    }
}

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("failed to evaluate admission: {0}")]
    Query(#[source] gantry_core::Error),

    /// The decision was made but could not be recorded on the job.
    #[error("max in flight reached={reached} could not be saved: {source}")]
    StatusWrite {
        reached: bool,
        #[source]
        source: gantry_core::Error,
    },
}

impl AdmissionError {
    /// The decision that was computed before the failure, if any.
    pub fn decision(&self) -> Option<bool> {
        match self {
            AdmissionError::Query(_) => None,
            AdmissionError::StatusWrite { reached, .. } => Some(*reached),
        }
    }
}

impl From<AdmissionError> for gantry_core::Error {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::Query(e) => e,
            AdmissionError::StatusWrite { source, .. } => source,
        }
    }
}

/// Decides whether a candidate build may start.
pub struct AdmissionController {
    workers: Arc<dyn WorkerInventory>,
    limits: CapacityLimits,
}

impl AdmissionController {
    pub fn new(workers: Arc<dyn WorkerInventory>, limits: CapacityLimits) -> Self {
        Self { workers, limits }
    }

    /// Returns `true` when `candidate_build_id` must not start yet, and
    /// persists that answer on the job.
    pub async fn update_max_in_flight_reached(
        &self,
        job: &dyn Job,
        candidate_build_id: i64,
    ) -> Result<bool, AdmissionError> {
        let reached = if self.cluster_saturated().await? {
            true
        } else {
            self.job_limit_reached(job, candidate_build_id).await?
        };

        debug!(
            pipeline = job.pipeline(),
            job = job.name(),
            build_id = candidate_build_id,
            reached,
            "evaluated max in flight"
        );

        job.set_max_in_flight_reached(reached)
            .await
            .map_err(|source| AdmissionError::StatusWrite { reached, source })?;

        Ok(reached)
    }

    async fn cluster_saturated(&self) -> Result<bool, AdmissionError> {
        let workers = self.workers.workers().await.map_err(AdmissionError::Query)?;

        let safe_capacity = self.limits.safe_capacity(workers.len());
        let active: u64 = workers
            .iter()
            .map(|w| u64::from(w.active_containers()))
            .sum();

        if active >= safe_capacity {
            debug!(
                workers = workers.len(),
                active, safe_capacity, "cluster container capacity saturated"
            );
            return Ok(true);
        }
        Ok(false)
    }

    async fn job_limit_reached(
        &self,
        job: &dyn Job,
        candidate_build_id: i64,
    ) -> Result<bool, AdmissionError> {
        let max_in_flight = job.max_in_flight();
        if max_in_flight == 0 {
            return Ok(false);
        }

        let scope = job.serial_scope();

        let running = job
            .running_builds_by_serial_group(&scope)
            .await
            .map_err(AdmissionError::Query)?;
        if running.len() >= max_in_flight as usize {
            return Ok(true);
        }

        let next = job
            .next_pending_build_by_serial_group(&scope)
            .await
            .map_err(AdmissionError::Query)?;

        // A vanished next build (e.g. aborted concurrently) counts as reached.
        Ok(match next {
            Some(next) => next.id != candidate_build_id,
            None => true,
        })
    }
}
