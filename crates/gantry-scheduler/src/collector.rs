//! Removal of stalled workers.

use async_trait::async_trait;
use gantry_core::{Result, Task, WorkerLifecycle};
use std::sync::Arc;
use tracing::info;

/// Task behind the `collector` component. Stalled workers are deleted so
/// their containers stop counting toward cluster capacity.
pub struct WorkerCollector {
    lifecycle: Arc<dyn WorkerLifecycle>,
}

impl WorkerCollector {
    pub fn new(lifecycle: Arc<dyn WorkerLifecycle>) -> Self {
        Self { lifecycle }
    }
}

#[async_trait]
impl Task for WorkerCollector {
    async fn run(&self) -> Result<()> {
        let removed = self.lifecycle.delete_stalled_workers().await?;
        if !removed.is_empty() {
            info!(count = removed.len(), workers = ?removed, "removed stalled workers");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeLifecycle {
        stalled: Vec<String>,
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl WorkerLifecycle for FakeLifecycle {
        async fn delete_stalled_workers(&self) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Storage("workers table locked".to_string()));
            }
            Ok(self.stalled.clone())
        }
    }

    #[tokio::test]
    async fn test_deletes_stalled_workers() {
        let lifecycle = Arc::new(FakeLifecycle {
            stalled: vec!["worker-3".to_string()],
            calls: AtomicUsize::new(0),
            fail: false,
        });

        WorkerCollector::new(lifecycle.clone()).run().await.unwrap();

        assert_eq!(lifecycle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_returned() {
        let lifecycle = Arc::new(FakeLifecycle {
            stalled: Vec::new(),
            calls: AtomicUsize::new(0),
            fail: true,
        });

        let result = WorkerCollector::new(lifecycle).run().await;

        assert!(matches!(result, Err(Error::Storage(_))));
    }
}
