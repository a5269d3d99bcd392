//! Advisory locks backed by PostgreSQL session locks.
//!
//! Every held lock pins its own pooled connection, since session-level
//! advisory locks belong to the connection that took them. A lock whose
//! unlock fails, or that is dropped without being released, closes its
//! connection instead of returning it to the pool, which ends the session
//! and frees the lock server-side.

use async_trait::async_trait;
use gantry_core::{Error, Lock, LockFactory, LockId, Result};
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::DbError;

/// Lock ids currently claimed by this process.
#[derive(Clone, Default)]
pub(crate) struct HeldLocks(Arc<Mutex<HashSet<LockId>>>);

impl HeldLocks {
    fn ids(&self) -> MutexGuard<'_, HashSet<LockId>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claims `id`, or returns `None` if this process already holds it.
    pub(crate) fn claim(&self, id: &LockId) -> Option<Claim> {
        if !self.ids().insert(id.clone()) {
            return None;
        }
        Some(Claim {
            id: id.clone(),
            held: self.clone(),
        })
    }

    #[cfg(test)]
    pub(crate) fn is_held(&self, id: &LockId) -> bool {
        self.ids().contains(id)
    }
}

/// Membership of one id in [`HeldLocks`]; dropping it frees the id.
pub(crate) struct Claim {
    id: LockId,
    held: HeldLocks,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.held.ids().remove(&self.id);
    }
}

/// Lock factory using `pg_try_advisory_lock`.
///
/// Postgres advisory locks are reentrant per session, so the factory also
/// tracks the ids this process holds and refuses to hand out the same id
/// twice.
#[derive(Clone)]
pub struct PgLockFactory {
    pool: PgPool,
    held: HeldLocks,
}

impl PgLockFactory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            held: HeldLocks::default(),
        }
    }

    async fn try_lock(&self, id: &LockId) -> Result<Option<PoolConnection<Postgres>>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;

        let acquired: bool =
            sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtextextended($1, 0))")
                .bind(id.as_str())
                .fetch_one(&mut *conn)
                .await
                .map_err(DbError::from)?;

        Ok(acquired.then_some(conn))
    }
}

#[async_trait]
impl LockFactory for PgLockFactory {
    async fn acquire(&self, id: LockId) -> Result<Option<Box<dyn Lock>>> {
        let Some(claim) = self.held.claim(&id) else {
            debug!(lock = %id, "lock already held by this process");
            return Ok(None);
        };

        // A busy or failed attempt drops `claim`, freeing the id again.
        let Some(conn) = self.try_lock(&id).await? else {
            return Ok(None);
        };

        debug!(lock = %id, "acquired lock");
        Ok(Some(Box::new(PgLock {
            id,
            conn: Some(conn),
            _claim: claim,
        })))
    }
}

/// A held advisory lock and the connection that owns it.
pub struct PgLock {
    id: LockId,
    conn: Option<PoolConnection<Postgres>>,
    _claim: Claim,
}

#[async_trait]
impl Lock for PgLock {
    fn id(&self) -> &LockId {
        &self.id
    }

    async fn release(mut self: Box<Self>) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let unlocked: std::result::Result<bool, sqlx::Error> =
            sqlx::query_scalar("SELECT pg_advisory_unlock(hashtextextended($1, 0))")
                .bind(self.id.as_str())
                .fetch_one(&mut *conn)
                .await;

        match unlocked {
            Ok(true) => {
                debug!(lock = %self.id, "released lock");
                Ok(())
            }
            Ok(false) => {
                drop(conn.detach());
                Err(Error::Lock(format!(
                    "lock {} was not held by its session",
                    self.id
                )))
            }
            Err(e) => {
                drop(conn.detach());
                Err(DbError::from(e).into())
            }
        }
    }
}

impl Drop for PgLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!(lock = %self.id, "lock dropped without release; closing its connection");
            drop(conn.detach());
        }
    }
}
