//! Periodic task runner guarded by a fleet-wide lock.
//!
//! Every coordinator runs one `LockRunner` per component. On each tick the
//! runner consults the component's pause flag and interval, then races the
//! rest of the fleet for the component's lock; whoever wins runs the task
//! once while holding it.

use futures::FutureExt;
use gantry_core::{Component, ComponentRegistry, Lock, LockFactory, LockId, Task};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Runs a task at most once per tick, and only while holding its lock.
pub struct LockRunner {
    task: Arc<dyn Task>,
    component: String,
    locks: Arc<dyn LockFactory>,
    components: Arc<dyn ComponentRegistry>,
    interval: Duration,
}

impl LockRunner {
    pub fn new(
        task: Arc<dyn Task>,
        component: impl Into<String>,
        locks: Arc<dyn LockFactory>,
        components: Arc<dyn ComponentRegistry>,
        interval: Duration,
    ) -> Self {
        Self {
            task,
            component: component.into(),
            locks,
            components,
            interval,
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// Tick until `shutdown` flips to `true` or its sender goes away.
    ///
    /// Shutdown is only observed between ticks; a task that is already
    /// running finishes first.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            component = %self.component,
            interval_ms = self.interval.as_millis(),
            "lock runner started"
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => self.tick().await,
            }
        }

        info!(component = %self.component, "lock runner shutting down");
    }

    async fn tick(&self) {
        let component = match self.components.find(&self.component).await {
            Ok(Some(component)) => component,
            Ok(None) => {
                warn!(component = %self.component, "component not found; skipping tick");
                return;
            }
            Err(e) => {
                error!(component = %self.component, error = %e, "failed to find component");
                return;
            }
        };

        if component.paused() {
            debug!(component = %self.component, "component is paused");
            return;
        }

        if !component.interval_elapsed() {
            debug!(component = %self.component, "interval has not elapsed");
            return;
        }

        let lock_id = LockId::task(&self.component);
        let lock = match self.locks.acquire(lock_id.clone()).await {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                debug!(component = %self.component, lock = %lock_id, "lock held elsewhere");
                return;
            }
            Err(e) => {
                warn!(component = %self.component, lock = %lock_id, error = %e, "failed to acquire lock");
                return;
            }
        };

        self.run_locked(component.as_ref(), lock).await;
    }

    /// Run the task under `lock`, then record the run and release the lock
    /// whatever the task's outcome.
    async fn run_locked(&self, component: &dyn Component, lock: Box<dyn Lock>) {
        debug!(component = %self.component, "running task");

        match AssertUnwindSafe(self.task.run()).catch_unwind().await {
            Ok(Ok(())) => debug!(component = %self.component, "task completed"),
            Ok(Err(e)) => error!(component = %self.component, error = %e, "task failed"),
            Err(panic) => error!(
                component = %self.component,
                panic = %panic_message(panic.as_ref()),
                "task panicked"
            ),
        }

        if let Err(e) = component.update_last_ran().await {
            error!(component = %self.component, error = %e, "failed to update last ran");
        }

        let lock_id = lock.id().clone();
        if let Err(e) = lock.release().await {
            error!(component = %self.component, lock = %lock_id, error = %e, "failed to release lock");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
