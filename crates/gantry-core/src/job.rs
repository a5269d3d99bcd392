//! Jobs as seen by admission control.

use async_trait::async_trait;

use crate::{Build, Result};

/// A job of a pipeline, keyed by (pipeline, name).
#[async_trait]
pub trait Job: Send + Sync {
    fn pipeline(&self) -> &str;

    fn name(&self) -> &str;

    /// Maximum number of concurrently running builds. 0 means unbounded.
    fn max_in_flight(&self) -> u32;

    /// Serial groups the job belongs to. Empty when none are configured.
    fn serial_groups(&self) -> &[String];

    /// Builds running in any job of the given serial groups.
    async fn running_builds_by_serial_group(&self, serial_groups: &[String]) -> Result<Vec<Build>>;

    /// Earliest queued pending build across the given serial groups.
    async fn next_pending_build_by_serial_group(
        &self,
        serial_groups: &[String],
    ) -> Result<Option<Build>>;

    /// Persist the advisory "max in flight reached" status flag.
    async fn set_max_in_flight_reached(&self, reached: bool) -> Result<()>;

    /// Pending builds of this job that no dispatcher has claimed, lowest id first.
    async fn pending_builds(&self) -> Result<Vec<Build>>;

    /// Claim a pending build. Returns `false` if another dispatcher got there first.
    async fn schedule_build(&self, build_id: i64) -> Result<bool>;

    /// The mutual exclusion scope: the serial groups, or the job's own name.
    fn serial_scope(&self) -> Vec<String> {
        if self.serial_groups().is_empty() {
            vec![self.name().to_string()]
        } else {
            self.serial_groups().to_vec()
        }
    }
}

/// Enumerates jobs for a scheduling pass.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn jobs(&self) -> Result<Vec<Box<dyn Job>>>;
}
