//! Component repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gantry_config::ComponentConfig;
use gantry_core::{Component, ComponentRegistry, Result};
use sqlx::PgPool;

use crate::{DbError, DbResult};

#[derive(Debug, Clone, sqlx::FromRow)]
struct ComponentRow {
    name: String,
    paused: bool,
    interval_ms: i64,
    last_ran: Option<DateTime<Utc>>,
}

/// A component row loaded from the database.
pub struct PgComponent {
    pool: PgPool,
    name: String,
    paused: bool,
    interval: chrono::Duration,
    last_ran: Option<DateTime<Utc>>,
}

impl PgComponent {
    fn from_row(pool: PgPool, row: ComponentRow) -> Self {
        Self {
            pool,
            name: row.name,
            paused: row.paused,
            interval: chrono::Duration::milliseconds(row.interval_ms),
            last_ran: row.last_ran,
        }
    }
}

/// Whether `interval` has passed between `last_ran` and `now`.
/// A component that never ran is always due.
pub fn interval_elapsed(
    last_ran: Option<DateTime<Utc>>,
    interval: chrono::Duration,
    now: DateTime<Utc>,
) -> bool {
    match last_ran {
        None => true,
        Some(last_ran) => now >= last_ran + interval,
    }
}

#[async_trait]
impl Component for PgComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn paused(&self) -> bool {
        self.paused
    }

    fn interval_elapsed(&self) -> bool {
        interval_elapsed(self.last_ran, self.interval, Utc::now())
    }

    async fn update_last_ran(&self) -> Result<()> {
        let result = sqlx::query("UPDATE components SET last_ran = NOW() WHERE name = $1")
            .bind(&self.name)
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;

        if result.rows_affected() != 1 {
            return Err(DbError::UnexpectedRowCount(result.rows_affected()).into());
        }
        Ok(())
    }
}

/// PostgreSQL implementation of ComponentRegistry.
#[derive(Clone)]
pub struct PgComponentRegistry {
    pool: PgPool,
}

impl PgComponentRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create missing components and refresh intervals of existing ones.
    /// Paused flags and last-ran timestamps of existing rows are left alone.
    pub async fn seed(&self, components: &[ComponentConfig]) -> DbResult<()> {
        for component in components {
            let interval_ms = i64::try_from(component.interval.as_millis()).map_err(|_| {
                DbError::InvalidData(format!("interval of component {} overflows", component.name))
            })?;

            sqlx::query(
                r#"
                INSERT INTO components (name, paused, interval_ms)
                VALUES ($1, $2, $3)
                ON CONFLICT (name) DO UPDATE SET interval_ms = EXCLUDED.interval_ms
                "#,
            )
            .bind(&component.name)
            .bind(component.paused)
            .bind(interval_ms)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ComponentRegistry for PgComponentRegistry {
    async fn find(&self, name: &str) -> Result<Option<Box<dyn Component>>> {
        let row = sqlx::query_as::<_, ComponentRow>(
            "SELECT name, paused, interval_ms, last_ran FROM components WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(row.map(|row| Box::new(PgComponent::from_row(self.pool.clone(), row)) as Box<dyn Component>))
    }
}
