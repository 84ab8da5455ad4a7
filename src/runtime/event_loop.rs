//! Event loop group backed by a multi-threaded tokio runtime.
//!
//! A group owns a fixed pool of worker threads that multiplex socket
//! readiness for every channel spawned onto it. The group must be shut down
//! explicitly on every exit path so worker threads never outlive the role
//! that created them.

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

/// A named pool of event loop threads.
pub struct EventLoopGroup {
    name: String,
    workers: usize,
    runtime: Runtime,
}

impl EventLoopGroup {
    /// Create a group with `workers` threads (defaults to the number of CPU cores).
    pub fn new(name: &str, workers: Option<usize>) -> io::Result<Self> {
        let workers = match workers {
            Some(0) | None => num_cpus(),
            Some(n) => n,
        };

        let thread_prefix = name.to_string();
        let next_id = Arc::new(AtomicUsize::new(0));
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name_fn(move || {
                let id = next_id.fetch_add(1, Ordering::Relaxed);
                format!("{thread_prefix}-worker-{id}")
            })
            .enable_all()
            .build()?;

        debug!(group = name, workers, "Event loop group created");

        Ok(Self {
            name: name.to_string(),
            workers,
            runtime,
        })
    }

    /// Number of worker threads in this group.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run a future to completion on this group.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Shut the group down, waiting up to `timeout` for running tasks.
    pub fn shutdown_gracefully(self, timeout: Duration) {
        let name = self.name;
        self.runtime.shutdown_timeout(timeout);
        info!(group = %name, "Event loop group shut down");
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
