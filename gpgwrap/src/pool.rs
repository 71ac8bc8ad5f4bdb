//! Background worker pool for tool calls that must not block the host.
//!
//! Host callbacks arrive on the host's own thread, which is not a tokio
//! thread. [`DecryptPool`] owns a multi-threaded runtime and bridges the
//! two sides:
//!
//! - [`submit`](DecryptPool::submit) spawns a task and returns at once; the
//!   number of tasks doing work at the same time is bounded by a semaphore.
//! - [`block_on`](DecryptPool::block_on) runs a future to completion on the
//!   calling thread (used for encryption, which the host waits for).
//! - [`shutdown`](DecryptPool::shutdown) stops accepting work, gives
//!   in-flight tasks a grace period, then aborts whatever is left.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Errors from the worker pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The pool has been shut down and accepts no more work.
    #[error("worker pool is shut down")]
    Closed,

    /// The tokio runtime could not be built.
    #[error("failed to start worker runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Sizing and shutdown settings for a [`DecryptPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Runtime worker threads.
    pub worker_threads: usize,
    /// Maximum number of tasks running their work at once.
    pub max_concurrent: usize,
    /// How long [`DecryptPool::shutdown`] waits before aborting tasks.
    pub shutdown_grace: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            max_concurrent: 4,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

/// What [`DecryptPool::shutdown`] did with outstanding tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that finished during the grace period.
    pub drained: usize,
    /// Tasks still running when the grace period ran out.
    pub aborted: usize,
}

/// Bounded, drainable pool of background tasks.
pub struct DecryptPool {
    /// Owned runtime, taken out on shutdown.
    runtime: Mutex<Option<Runtime>>,
    /// Handle used to spawn and block without holding the runtime lock.
    handle: Handle,
    /// Every task spawned and not yet reaped.
    tasks: Mutex<JoinSet<()>>,
    /// Limits how many tasks do their work at the same time.
    permits: Arc<Semaphore>,
    /// Set once shutdown begins.
    closed: AtomicBool,
    shutdown_grace: Duration,
}

impl DecryptPool {
    /// Start a pool with its own runtime.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Runtime`] if the runtime cannot be built.
    pub fn start(config: &PoolConfig) -> Result<Self, PoolError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name("gpgwrap-worker")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        tracing::debug!(
            workers = config.worker_threads,
            max_concurrent = config.max_concurrent,
            "worker pool started"
        );

        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            handle,
            tasks: Mutex::new(JoinSet::new()),
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            closed: AtomicBool::new(false),
            shutdown_grace: config.shutdown_grace,
        })
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of tasks spawned and not yet reaped.
    #[must_use]
    pub fn pending(&self) -> usize {
        let mut tasks = self.tasks.lock();
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Spawn `work` in the background. Returns without waiting.
    ///
    /// The task waits for a free permit before running `work`, so at most
    /// `max_concurrent` tasks make progress at once; the rest queue up.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] after shutdown.
    pub fn submit<F>(&self, work: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        let permits = Arc::clone(&self.permits);
        let mut tasks = self.tasks.lock();
        while tasks.try_join_next().is_some() {}
        tasks.spawn_on(
            async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                work.await;
            },
            &self.handle,
        );
        Ok(())
    }

    /// Run `future` to completion on the calling thread.
    ///
    /// Must not be called from inside a tokio runtime; the same holds for
    /// [`shutdown`](Self::shutdown).
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] after shutdown.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output, PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        Ok(self.handle.block_on(future))
    }

    /// Stop accepting work, wait up to the grace period for queued and
    /// running tasks, then abort the rest and stop the runtime.
    ///
    /// Calling it again is a no-op returning an empty report.
    pub fn shutdown(&self) -> ShutdownReport {
        if self.closed.swap(true, Ordering::AcqRel) {
            return ShutdownReport::default();
        }

        let Some(runtime) = self.runtime.lock().take() else {
            return ShutdownReport::default();
        };
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        let grace = self.shutdown_grace;

        let report = runtime.block_on(async {
            let mut drained = 0;
            let waited = tokio::time::timeout(grace, async {
                while tasks.join_next().await.is_some() {
                    drained += 1;
                }
            })
            .await;
            let aborted = if waited.is_err() { tasks.len() } else { 0 };
            tasks.shutdown().await;
            ShutdownReport { drained, aborted }
        });

        runtime.shutdown_background();
        tracing::info!(
            drained = report.drained,
            aborted = report.aborted,
            "worker pool shut down"
        );
        report
    }
}

impl Drop for DecryptPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get_mut().take() {
            self.tasks.get_mut().abort_all();
            runtime.shutdown_background();
        }
    }
}
