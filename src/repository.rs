//! Synchronizer: observe the local collection, refresh it from the remote.
//!
//! Refresh pipeline, one independent instance per call:
//!
//! ```text
//!   Idle ─▶ RemoteCallInFlight ─┬─▶ StorageWriteInFlight ─┬─▶ Completed
//!              (network ctx)    │        (storage ctx)    └─▶ Failed
//!                               ├─▶ Completed   (absent or empty result, no write)
//!                               └─▶ Failed      (no write)
//! ```
//!
//! Failures are turned into one log record under [`LOG_TARGET`] and dropped.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::oneshot;

use crate::error::SyncError;
use crate::executor::{Contexts, Executor};
use crate::feed::LiveFeed;
use crate::record::{Book, RecordList};
use crate::remote::RemoteSource;
use crate::store::LocalStore;

/// Fixed target for every record this component logs.
pub const LOG_TARGET: &str = "booksync::repository";

/// Message of the record logged when a refresh fails.
pub const FAILURE_MESSAGE: &str = "Fetching failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    RemoteCallInFlight,
    StorageWriteInFlight,
    Completed,
    Failed,
}

pub struct Synchronizer<R> {
    remote: Arc<dyn RemoteSource<R>>,
    store: Arc<dyn LocalStore<R>>,
    delivery: Arc<dyn Executor>,
    contexts: Contexts,
    feed: OnceLock<LiveFeed<RecordList<R>>>,
    refresh_seq: AtomicU64,
}

impl<R> fmt::Debug for Synchronizer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronizer")
            .field("listening", &self.feed.get().is_some())
            .field("refreshes", &self.refresh_seq.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<R> Synchronizer<R>
where
    R: Clone + PartialEq + Send + Sync + 'static,
{
    /// `contexts.storage` also hosts the task forwarding the store's change
    /// stream, so it must accept a long-lived task.
    pub fn new(
        remote: Arc<dyn RemoteSource<R>>,
        store: Arc<dyn LocalStore<R>>,
        delivery: Arc<dyn Executor>,
        contexts: Contexts,
    ) -> Self {
        Self {
            remote,
            store,
            delivery,
            contexts,
            feed: OnceLock::new(),
            refresh_seq: AtomicU64::new(0),
        }
    }

    /// Live view of the local collection.
    ///
    /// The first call connects to the store; every later call returns a
    /// handle to the same feed. The connection is never torn down.
    pub fn subscribe_to_local_updates(&self) -> LiveFeed<RecordList<R>> {
        self.feed
            .get_or_init(|| {
                let feed = LiveFeed::new(Arc::clone(&self.delivery));
                feed.drive(self.store.listen(), self.contexts.storage.as_ref());
                tracing::debug!(target: LOG_TARGET, "listening for local updates");
                feed
            })
            .clone()
    }

    pub fn local_store(&self) -> Arc<dyn LocalStore<R>> {
        Arc::clone(&self.store)
    }

    /// Fetch from the remote and store the result. Returns immediately;
    /// the outcome is only visible through the store and the log.
    pub fn refresh(&self) {
        self.start_refresh(None);
    }

    /// Like [`refresh`](Self::refresh), but lets the caller await the
    /// terminal state. The failure cause is still only logged.
    pub async fn refresh_and_wait(&self) -> RefreshState {
        let (done_tx, done_rx) = oneshot::channel();
        self.start_refresh(Some(done_tx));
        done_rx.await.unwrap_or(RefreshState::Failed)
    }

    fn start_refresh(&self, done: Option<oneshot::Sender<RefreshState>>) {
        let id = self.refresh_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let remote = Arc::clone(&self.remote);
        let store = Arc::clone(&self.store);
        let storage = Arc::clone(&self.contexts.storage);

        trace_transition(id, RefreshState::Idle);
        self.contexts.network.execute(Box::pin(async move {
            let outcome = run_refresh(id, remote, store, storage).await;
            let state = report(id, outcome);
            if let Some(done) = done {
                let _ = done.send(state);
            }
        }));
    }
}

async fn run_refresh<R>(
    id: u64,
    remote: Arc<dyn RemoteSource<R>>,
    store: Arc<dyn LocalStore<R>>,
    storage: Arc<dyn Executor>,
) -> Result<(), SyncError>
where
    R: Send + 'static,
{
    trace_transition(id, RefreshState::RemoteCallInFlight);
    let Some(records) = remote.get_all().await?.filter(|records| !records.is_empty()) else {
        tracing::debug!(target: LOG_TARGET, refresh = id, "remote returned no records, skipping write");
        return Ok(());
    };

    trace_transition(id, RefreshState::StorageWriteInFlight);
    let rows = records.len();
    let (written_tx, written_rx) = oneshot::channel();
    storage.execute(Box::pin(async move {
        let _ = written_tx.send(store.insert(records).await);
    }));
    written_rx.await.map_err(|_| SyncError::StorageAbandoned)??;

    tracing::debug!(target: LOG_TARGET, refresh = id, rows, "stored remote records");
    Ok(())
}

/// Top-level handler: log failures, never propagate them.
fn report(id: u64, outcome: Result<(), SyncError>) -> RefreshState {
    let state = match outcome {
        Ok(()) => RefreshState::Completed,
        Err(err) => {
            tracing::info!(target: LOG_TARGET, refresh = id, error = %err, "{}", FAILURE_MESSAGE);
            RefreshState::Failed
        }
    };
    trace_transition(id, state);
    state
}

fn trace_transition(id: u64, state: RefreshState) {
    tracing::trace!(target: LOG_TARGET, refresh = id, state = ?state, "refresh state");
}

// ─── Process-wide instance ────────────────────────────────────────────────────

static INSTANCE: OnceLock<Synchronizer<Book>> = OnceLock::new();

impl Synchronizer<Book> {
    /// The process-wide synchronizer, built from the first caller's
    /// collaborators. Later arguments are dropped unused.
    pub fn get_instance(
        remote: Arc<dyn RemoteSource<Book>>,
        store: Arc<dyn LocalStore<Book>>,
        delivery: Arc<dyn Executor>,
        contexts: Contexts,
    ) -> &'static Synchronizer<Book> {
        INSTANCE.get_or_init(|| {
            tracing::debug!(target: LOG_TARGET, "creating process-wide synchronizer");
            Synchronizer::new(remote, store, delivery, contexts)
        })
    }

    /// The process-wide synchronizer if one was already built.
    pub fn existing_instance() -> Option<&'static Synchronizer<Book>> {
        INSTANCE.get()
    }
}
