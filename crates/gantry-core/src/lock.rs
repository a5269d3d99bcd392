//! Advisory lock identifiers and traits.
//!
//! Locks are named, non-reentrant and non-blocking: acquisition either
//! succeeds immediately or reports that another holder owns the name.

use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Name of an advisory lock shared by every coordinator in the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct LockId(String);

impl LockId {
    /// Lock guarding a periodic maintenance task.
    pub fn task(name: &str) -> Self {
        Self(format!("task:{name}"))
    }

    /// Lock guarding schema migrations. Distinct from every task lock.
    pub fn database_migration() -> Self {
        Self("database-migration".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A held lock. Dropping it without calling `release` is allowed but leaves
/// reclamation to the backing store.
#[async_trait]
pub trait Lock: Send {
    fn id(&self) -> &LockId;

    /// Release the lock. Consumes the handle so a lock is released at most once.
    async fn release(self: Box<Self>) -> Result<()>;
}

/// Source of advisory locks.
#[async_trait]
pub trait LockFactory: Send + Sync {
    /// Try to take the named lock without waiting.
    ///
    /// Returns `Ok(None)` when another holder owns it.
    async fn acquire(&self, id: LockId) -> Result<Option<Box<dyn Lock>>>;
}
