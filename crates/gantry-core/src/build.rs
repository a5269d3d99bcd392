//! Build types and build log retention.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Lifecycle state of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Pending,
    Started,
    Succeeded,
    Failed,
    Errored,
    Aborted,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Pending => "pending",
            BuildStatus::Started => "started",
            BuildStatus::Succeeded => "succeeded",
            BuildStatus::Failed => "failed",
            BuildStatus::Errored => "errored",
            BuildStatus::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BuildStatus::Pending | BuildStatus::Started)
    }
}

impl std::str::FromStr for BuildStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(BuildStatus::Pending),
            "started" => Ok(BuildStatus::Started),
            "succeeded" => Ok(BuildStatus::Succeeded),
            "failed" => Ok(BuildStatus::Failed),
            "errored" => Ok(BuildStatus::Errored),
            "aborted" => Ok(BuildStatus::Aborted),
            other => Err(Error::InvalidInput(format!("unknown build status: {other}"))),
        }
    }
}

/// A build of a job. Read-only from the coordinator's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    /// Monotonic id; lower ids were queued earlier.
    pub id: i64,
    pub job_name: String,
    pub status: BuildStatus,
    /// Set once a dispatcher claimed the pending build.
    pub scheduled: bool,
    pub created_at: DateTime<Utc>,
}

/// How many builds of a job keep their event logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub job_id: i64,
    pub job_name: String,
    pub builds_to_retain: u32,
}

/// Storage for build event logs, used by the build reaper.
#[async_trait]
pub trait BuildLogStore: Send + Sync {
    /// Jobs that keep a finite number of build logs.
    async fn retention_policies(&self) -> Result<Vec<RetentionPolicy>>;

    /// Finished builds outside the retention window whose logs still exist,
    /// oldest first, at most `limit`.
    async fn reapable_builds(&self, policy: &RetentionPolicy, limit: usize) -> Result<Vec<i64>>;

    /// Delete the event logs of the given builds.
    async fn delete_build_events(&self, build_ids: &[i64]) -> Result<()>;
}
