//! Execution contexts: where deferred work runs.
//!
//! The synchronizer never spawns threads itself. It is handed three
//! contexts and submits futures to them:
//!   delivery → [`DeliveryDispatcher`], one thread, strictly serial
//!   network  → [`WorkerPool`] sized for remote I/O
//!   storage  → [`WorkerPool`] sized for local writes
//! Tests swap any of them for [`InlineExecutor`].

use std::fmt;
use std::sync::Arc;
use std::thread;

use futures::future::BoxFuture;
use tokio::runtime::{Builder, Handle, Runtime, TryCurrentError};
use tokio::sync::mpsc;

/// Capability to run a future later, possibly on another thread.
pub trait Executor: Send + Sync {
    fn execute(&self, task: BoxFuture<'static, ()>);
}

// ─── Delivery dispatcher ──────────────────────────────────────────────────────

/// Single-threaded, in-order context for handing values to subscribers.
///
/// Each task runs to completion before the next one starts. The thread exits
/// once every handle to the dispatcher is dropped and the queue is drained.
#[derive(Clone)]
pub struct DeliveryDispatcher {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<BoxFuture<'static, ()>>,
}

impl DeliveryDispatcher {
    pub fn spawn(name: &str) -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<BoxFuture<'static, ()>>();
        let runtime = Builder::new_current_thread().enable_all().build()?;

        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    while let Some(task) = rx.recv().await {
                        task.await;
                    }
                });
            })?;

        tracing::debug!(dispatcher = name, "delivery dispatcher started");
        Ok(Self {
            name: Arc::from(name),
            tx,
        })
    }
}

impl Executor for DeliveryDispatcher {
    fn execute(&self, task: BoxFuture<'static, ()>) {
        if self.tx.send(task).is_err() {
            tracing::warn!(dispatcher = %self.name, "delivery dispatcher stopped, task dropped");
        }
    }
}

impl fmt::Debug for DeliveryDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryDispatcher")
            .field("name", &self.name)
            .finish()
    }
}

// ─── Worker pools ─────────────────────────────────────────────────────────────

/// A named multi-thread runtime dedicated to one kind of background I/O.
pub struct WorkerPool {
    name: String,
    handle: Handle,
    runtime: Option<Runtime>,
}

impl WorkerPool {
    pub fn new(name: &str, threads: usize) -> std::io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .thread_name(name)
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        tracing::debug!(pool = name, threads = threads.max(1), "worker pool started");
        Ok(Self {
            name: name.to_string(),
            handle,
            runtime: Some(runtime),
        })
    }
}

impl Executor for WorkerPool {
    fn execute(&self, task: BoxFuture<'static, ()>) {
        self.handle.spawn(task);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Dropping a runtime blocks; shutdown_background is safe from async code.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool").field("name", &self.name).finish()
    }
}

/// Spawns onto a runtime someone else owns.
#[derive(Debug, Clone)]
pub struct RuntimeExecutor {
    handle: Handle,
}

impl RuntimeExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Executor for the runtime the caller is running on.
    pub fn current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl Executor for RuntimeExecutor {
    fn execute(&self, task: BoxFuture<'static, ()>) {
        self.handle.spawn(task);
    }
}

// ─── Inline ───────────────────────────────────────────────────────────────────

/// Runs each task to completion on the submitting thread.
///
/// Only suitable for futures that make progress without a runtime driving
/// timers or sockets on the same thread, e.g. in-memory fakes in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, task: BoxFuture<'static, ()>) {
        pollster::block_on(task);
    }
}

// ─── Background context bundle ────────────────────────────────────────────────

/// The two background contexts used by a refresh.
#[derive(Clone)]
pub struct Contexts {
    pub network: Arc<dyn Executor>,
    pub storage: Arc<dyn Executor>,
}

impl Contexts {
    pub fn new(network: Arc<dyn Executor>, storage: Arc<dyn Executor>) -> Self {
        Self { network, storage }
    }

    /// Both contexts inline. Refreshes complete before `refresh` returns;
    /// do not combine with `subscribe_to_local_updates`, whose store stream
    /// never ends and would block the caller.
    pub fn inline() -> Self {
        Self::new(Arc::new(InlineExecutor), Arc::new(InlineExecutor))
    }

    /// Dedicated pools named `booksync-net` and `booksync-io`.
    pub fn worker_pools(network_threads: usize, storage_threads: usize) -> std::io::Result<Self> {
        let network = WorkerPool::new("booksync-net", network_threads)?;
        let storage = WorkerPool::new("booksync-io", storage_threads)?;
        Ok(Self::new(Arc::new(network), Arc::new(storage)))
    }
}

impl fmt::Debug for Contexts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contexts").finish_non_exhaustive()
    }
}
