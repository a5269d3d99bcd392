//! Worker inventory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Running,
    Stalled,
    Landing,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Running => "running",
            WorkerState::Stalled => "stalled",
            WorkerState::Landing => "landing",
        }
    }
}

impl std::str::FromStr for WorkerState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(WorkerState::Running),
            "stalled" => Ok(WorkerState::Stalled),
            "landing" => Ok(WorkerState::Landing),
            other => Err(Error::InvalidInput(format!("unknown worker state: {other}"))),
        }
    }
}

/// A registered worker and its container usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub name: String,
    pub state: WorkerState,
    pub active_containers: u32,
    pub expires_at: Option<DateTime<Utc>>,
}

impl WorkerRecord {
    pub fn active_containers(&self) -> u32 {
        self.active_containers
    }
}

/// Read access to the workers counted toward cluster capacity.
#[async_trait]
pub trait WorkerInventory: Send + Sync {
    async fn workers(&self) -> Result<Vec<WorkerRecord>>;
}

/// Removal of workers that stopped heartbeating.
#[async_trait]
pub trait WorkerLifecycle: Send + Sync {
    /// Delete workers whose heartbeat expired, returning their names.
    async fn delete_stalled_workers(&self) -> Result<Vec<String>>;
}
