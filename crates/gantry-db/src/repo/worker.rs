//! Worker repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gantry_core::{Result, WorkerInventory, WorkerLifecycle, WorkerRecord, WorkerState};
use sqlx::PgPool;

use crate::{DbError, DbResult};

#[derive(Debug, Clone, sqlx::FromRow)]
struct WorkerRow {
    name: String,
    state: String,
    active_containers: i32,
    expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<WorkerRow> for WorkerRecord {
    type Error = DbError;

    fn try_from(row: WorkerRow) -> DbResult<Self> {
        let state: WorkerState = row
            .state
            .parse()
            .map_err(|e: gantry_core::Error| DbError::InvalidData(e.to_string()))?;
        Ok(WorkerRecord {
            name: row.name,
            state,
            active_containers: u32::try_from(row.active_containers).unwrap_or(0),
            expires_at: row.expires_at,
        })
    }
}

/// PostgreSQL implementation of the worker inventory.
#[derive(Clone)]
pub struct PgWorkerRepository {
    pool: PgPool,
}

impl PgWorkerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkerInventory for PgWorkerRepository {
    /// Workers that still hold containers; stalled workers are excluded.
    async fn workers(&self) -> Result<Vec<WorkerRecord>> {
        let rows = sqlx::query_as::<_, WorkerRow>(
            r#"
            SELECT name, state, active_containers, expires_at
            FROM workers
            WHERE state <> 'stalled'
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        let workers = rows
            .into_iter()
            .map(WorkerRecord::try_from)
            .collect::<DbResult<Vec<_>>>()?;
        Ok(workers)
    }
}

#[async_trait]
impl WorkerLifecycle for PgWorkerRepository {
    async fn delete_stalled_workers(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            r#"
            DELETE FROM workers
            WHERE state = 'stalled'
                OR (expires_at IS NOT NULL AND expires_at < NOW())
            RETURNING name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(names)
    }
}
