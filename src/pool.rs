//! Bounded worker pool for build and run jobs.
//!
//! Builds can take minutes. Jobs are spawned onto the runtime as their own
//! tasks, at most `size` at a time, and the submitting request awaits the
//! result. Queued jobs wait for a permit in FIFO order.

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Limits concurrent build/run jobs.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Creates a pool running at most `size` jobs at once (minimum 1).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Returns the pool size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the number of idle workers.
    pub fn idle(&self) -> usize {
        self.permits.available_permits()
    }

    /// Runs `job` on a worker and waits for its result.
    ///
    /// The job keeps running to completion even if the caller stops waiting.
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let handle = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| Error::WorkerPool(e.to_string()))?;
            debug!("worker acquired");
            job.await
        });

        handle
            .await
            .map_err(|e| Error::WorkerPool(format!("job did not complete: {}", e)))?
    }
}
