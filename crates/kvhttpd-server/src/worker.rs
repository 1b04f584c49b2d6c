//! Worker thread management
//!
//! Workers are named OS threads that pop jobs off the shared [`JobQueue`]
//! until it is closed and drained. A job that panics is logged and dropped;
//! the worker keeps going.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use kvhttpd_core::JobQueue;

use crate::error::{ServerError, ServerResult};

/// Pool of worker threads
pub struct WorkerPool {
    /// Join handles for worker threads
    handles: Vec<JoinHandle<()>>,

    /// Number of workers requested
    num_workers: usize,

    /// Jobs finished across all workers (panicked ones included)
    completed: Arc<AtomicU64>,
}

impl WorkerPool {
    /// Create an empty pool; nothing runs until [`start`](Self::start)
    pub fn new(num_workers: usize) -> Self {
        Self {
            handles: Vec::with_capacity(num_workers),
            num_workers,
            completed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawn all workers, each running `serve` on jobs popped from `queue`
    ///
    /// If a thread cannot be spawned the queue is closed, the workers already
    /// started are joined, and the spawn error is returned.
    pub fn start<T, F>(&mut self, queue: Arc<JobQueue<T>>, serve: F) -> ServerResult<()>
    where
        T: Send + 'static,
        F: Fn(T) + Send + Sync + Clone + 'static,
    {
        for i in 0..self.num_workers {
            let queue_w = Arc::clone(&queue);
            let completed = Arc::clone(&self.completed);
            let serve = serve.clone();

            let spawned = thread::Builder::new()
                .name(format!("kvhttpd-worker-{}", i))
                .spawn(move || worker_loop(i, &queue_w, &serve, &completed));

            match spawned {
                Ok(handle) => self.handles.push(handle),
                Err(source) => {
                    tracing::error!(worker = i, error = %source, "failed to spawn worker");
                    queue.close();
                    for handle in self.handles.drain(..) {
                        let _ = handle.join();
                    }
                    return Err(ServerError::WorkerSpawn { index: i, source });
                }
            }
        }
        tracing::debug!(workers = self.num_workers, "worker pool started");
        Ok(())
    }

    /// Wait for all workers to finish
    ///
    /// Workers only exit once their queue is closed and empty.
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }

    /// Get number of workers
    #[inline]
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Number of running (spawned, not yet joined) workers
    #[inline]
    pub fn running(&self) -> usize {
        self.handles.len()
    }

    /// Jobs completed so far
    #[inline]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("num_workers", &self.num_workers)
            .field("running", &self.handles.len())
            .field("completed", &self.completed())
            .finish()
    }
}

fn worker_loop<T, F: Fn(T)>(id: usize, queue: &JobQueue<T>, serve: &F, completed: &AtomicU64) {
    tracing::trace!(worker = id, "worker started");
    while let Some(job) = queue.pop() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| serve(job))) {
            tracing::error!(
                worker = id,
                panic = panic_message(payload.as_ref()),
                "job panicked"
            );
        }
        completed.fetch_add(1, Ordering::Relaxed);
    }
    tracing::trace!(worker = id, "worker exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}
