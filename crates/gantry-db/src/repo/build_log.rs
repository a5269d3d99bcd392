//! Build event log retention queries.

use async_trait::async_trait;
use gantry_core::{BuildLogStore, Result, RetentionPolicy};
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
struct PolicyRow {
    id: i64,
    name: String,
    build_logs_to_retain: i32,
}

/// PostgreSQL implementation of BuildLogStore.
#[derive(Clone)]
pub struct PgBuildLogStore {
    pool: PgPool,
}

impl PgBuildLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BuildLogStore for PgBuildLogStore {
    async fn retention_policies(&self) -> Result<Vec<RetentionPolicy>> {
        let rows = sqlx::query_as::<_, PolicyRow>(
            r#"
            SELECT id, name, build_logs_to_retain
            FROM jobs
            WHERE build_logs_to_retain > 0
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(rows
            .into_iter()
            .map(|row| RetentionPolicy {
                job_id: row.id,
                job_name: row.name,
                builds_to_retain: u32::try_from(row.build_logs_to_retain).unwrap_or(0),
            })
            .collect())
    }

    async fn reapable_builds(&self, policy: &RetentionPolicy, limit: usize) -> Result<Vec<i64>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT b.id
            FROM builds b
            WHERE b.job_id = $1
                AND NOT b.reaped
                AND b.status NOT IN ('pending', 'started')
                AND b.id NOT IN (
                    SELECT id FROM builds
                    WHERE job_id = $1
                    ORDER BY id DESC
                    LIMIT $2
                )
            ORDER BY b.id ASC
            LIMIT $3
            "#,
        )
        .bind(policy.job_id)
        .bind(i64::from(policy.builds_to_retain))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(ids)
    }

    async fn delete_build_events(&self, build_ids: &[i64]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        sqlx::query("DELETE FROM build_events WHERE build_id = ANY($1)")
            .bind(build_ids)
            .execute(&mut *tx)
            .await
            .map_err(DbError::from)?;

        sqlx::query("UPDATE builds SET reaped = TRUE WHERE id = ANY($1)")
            .bind(build_ids)
            .execute(&mut *tx)
            .await
            .map_err(DbError::from)?;

        tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }
}
