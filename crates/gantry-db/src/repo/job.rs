//! Job and build queries used by admission control and dispatch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gantry_core::{Build, BuildStatus, Job, JobRepository, Result};
use sqlx::PgPool;

use crate::{DbError, DbResult};

const BUILD_COLUMNS: &str = "b.id, j.name AS job_name, b.status, b.scheduled, b.created_at";

#[derive(Debug, Clone, sqlx::FromRow)]
struct JobRow {
    id: i64,
    pipeline: String,
    name: String,
    max_in_flight: i32,
    serial_groups: Vec<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct BuildRow {
    id: i64,
    job_name: String,
    status: String,
    scheduled: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<BuildRow> for Build {
    type Error = DbError;

    fn try_from(row: BuildRow) -> DbResult<Self> {
        let status: BuildStatus = row
            .status
            .parse()
            .map_err(|e: gantry_core::Error| DbError::InvalidData(e.to_string()))?;
        Ok(Build {
            id: row.id,
            job_name: row.job_name,
            status,
            scheduled: row.scheduled,
            created_at: row.created_at,
        })
    }
}

fn into_builds(rows: Vec<BuildRow>) -> DbResult<Vec<Build>> {
    rows.into_iter().map(Build::try_from).collect()
}

/// Settings written when a pipeline's job configuration is saved.
#[derive(Debug, Clone, Default)]
pub struct JobSettings {
    pub pipeline: String,
    pub name: String,
    pub max_in_flight: u32,
    pub serial_groups: Vec<String>,
    pub build_logs_to_retain: u32,
}

/// A job row with its pool, implementing the admission control queries.
pub struct PgJob {
    pool: PgPool,
    id: i64,
    pipeline: String,
    name: String,
    max_in_flight: u32,
    serial_groups: Vec<String>,
}

impl PgJob {
    fn from_row(pool: PgPool, row: JobRow) -> Self {
        Self {
            pool,
            id: row.id,
            pipeline: row.pipeline,
            name: row.name,
            max_in_flight: u32::try_from(row.max_in_flight).unwrap_or(0),
            serial_groups: row.serial_groups,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }
}

#[async_trait]
impl Job for PgJob {
    fn pipeline(&self) -> &str {
        &self.pipeline
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn max_in_flight(&self) -> u32 {
        self.max_in_flight
    }

    fn serial_groups(&self) -> &[String] {
        &self.serial_groups
    }

    async fn running_builds_by_serial_group(&self, serial_groups: &[String]) -> Result<Vec<Build>> {
        let rows = sqlx::query_as::<_, BuildRow>(&format!(
            r#"
            SELECT DISTINCT {BUILD_COLUMNS}
            FROM builds b
            INNER JOIN jobs j ON b.job_id = j.id
            INNER JOIN jobs_serial_groups jsg ON j.id = jsg.job_id
                AND jsg.serial_group = ANY($2)
            WHERE j.pipeline = $1
                AND (b.status = 'started' OR (b.status = 'pending' AND b.scheduled))
            "#
        ))
        .bind(&self.pipeline)
        .bind(serial_groups)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(into_builds(rows)?)
    }

    async fn next_pending_build_by_serial_group(
        &self,
        serial_groups: &[String],
    ) -> Result<Option<Build>> {
        let row = sqlx::query_as::<_, BuildRow>(&format!(
            r#"
            SELECT DISTINCT {BUILD_COLUMNS}
            FROM builds b
            INNER JOIN jobs j ON b.job_id = j.id
            INNER JOIN jobs_serial_groups jsg ON j.id = jsg.job_id
                AND jsg.serial_group = ANY($2)
            WHERE j.pipeline = $1
                AND b.status = 'pending'
            ORDER BY b.id ASC
            LIMIT 1
            "#
        ))
        .bind(&self.pipeline)
        .bind(serial_groups)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(row.map(Build::try_from).transpose()?)
    }

    async fn set_max_in_flight_reached(&self, reached: bool) -> Result<()> {
        let result = sqlx::query("UPDATE jobs SET max_in_flight_reached = $1 WHERE id = $2")
            .bind(reached)
            .bind(self.id)
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;

        if result.rows_affected() != 1 {
            return Err(DbError::UnexpectedRowCount(result.rows_affected()).into());
        }
        Ok(())
    }

    async fn pending_builds(&self) -> Result<Vec<Build>> {
        let rows = sqlx::query_as::<_, BuildRow>(&format!(
            r#"
            SELECT {BUILD_COLUMNS}
            FROM builds b
            INNER JOIN jobs j ON b.job_id = j.id
            WHERE b.job_id = $1
                AND b.status = 'pending'
                AND NOT b.scheduled
            ORDER BY b.id ASC
            "#
        ))
        .bind(self.id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(into_builds(rows)?)
    }

    async fn schedule_build(&self, build_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE builds SET scheduled = TRUE
            WHERE id = $1 AND job_id = $2 AND status = 'pending' AND NOT scheduled
            "#,
        )
        .bind(build_id)
        .bind(self.id)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(result.rows_affected() == 1)
    }
}

/// PostgreSQL implementation of JobRepository.
#[derive(Clone)]
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Look up a job by pipeline and name.
    pub async fn find(&self, pipeline: &str, name: &str) -> DbResult<PgJob> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, pipeline, name, max_in_flight, serial_groups
            FROM jobs WHERE pipeline = $1 AND name = $2
            "#,
        )
        .bind(pipeline)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("job {}/{}", pipeline, name)))?;

        Ok(PgJob::from_row(self.pool.clone(), row))
    }

    /// Insert or update a job and rebuild its serial group scope.
    pub async fn save(&self, settings: &JobSettings) -> DbResult<PgJob> {
        let max_in_flight = i32::try_from(settings.max_in_flight)
            .map_err(|_| DbError::InvalidData("max_in_flight overflows".to_string()))?;
        let retain = i32::try_from(settings.build_logs_to_retain)
            .map_err(|_| DbError::InvalidData("build_logs_to_retain overflows".to_string()))?;

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO jobs (pipeline, name, max_in_flight, serial_groups, build_logs_to_retain)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (pipeline, name) DO UPDATE SET
                max_in_flight = EXCLUDED.max_in_flight,
                serial_groups = EXCLUDED.serial_groups,
                build_logs_to_retain = EXCLUDED.build_logs_to_retain
            RETURNING id, pipeline, name, max_in_flight, serial_groups
            "#,
        )
        .bind(&settings.pipeline)
        .bind(&settings.name)
        .bind(max_in_flight)
        .bind(&settings.serial_groups)
        .bind(retain)
        .fetch_one(&mut *tx)
        .await?;

        let scope = if settings.serial_groups.is_empty() {
            vec![settings.name.clone()]
        } else {
            settings.serial_groups.clone()
        };

        sqlx::query("DELETE FROM jobs_serial_groups WHERE job_id = $1")
            .bind(row.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO jobs_serial_groups (job_id, serial_group)
            SELECT $1, UNNEST($2::TEXT[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(row.id)
        .bind(&scope)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(PgJob::from_row(self.pool.clone(), row))
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn jobs(&self) -> Result<Vec<Box<dyn Job>>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, pipeline, name, max_in_flight, serial_groups
            FROM jobs ORDER BY pipeline, name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(rows
            .into_iter()
            .map(|row| Box::new(PgJob::from_row(self.pool.clone(), row)) as Box<dyn Job>)
            .collect())
    }
}
