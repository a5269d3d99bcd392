//! Periodic maintenance components.

use async_trait::async_trait;

use crate::Result;

/// Persisted metadata of a named background task.
#[async_trait]
pub trait Component: Send + Sync {
    fn name(&self) -> &str;

    /// Whether an operator paused the component.
    fn paused(&self) -> bool;

    /// Whether at least one interval has passed since the last run.
    fn interval_elapsed(&self) -> bool;

    /// Record that the component ran now.
    async fn update_last_ran(&self) -> Result<()>;
}

/// Lookup of components by name.
#[async_trait]
pub trait ComponentRegistry: Send + Sync {
    /// Returns `Ok(None)` when no component with that name exists.
    async fn find(&self, name: &str) -> Result<Option<Box<dyn Component>>>;
}
