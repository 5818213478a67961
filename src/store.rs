//! Local stores with change notification.
//!
//! Both stores keep the watched collection in a `tokio::sync::watch`
//! channel: a new listener sees the current list first, then one emission
//! per mutation. Mutations that leave the list unchanged still notify;
//! collapsing those is the feed's job, not the store's. A slow listener may
//! skip intermediate lists and only see the newest one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::error::StoreError;
use crate::record::{Keyed, RecordList};

/// Persisted collection the synchronizer writes to and observes.
#[async_trait]
pub trait LocalStore<R>: Send + Sync {
    /// Insert or replace `records` by key.
    async fn insert(&self, records: RecordList<R>) -> Result<(), StoreError>;

    /// Current collection, then the collection after every mutation.
    fn listen(&self) -> BoxStream<'static, RecordList<R>>;
}

/// Replace rows with matching keys in place, append the rest in order.
fn upsert<R: Keyed>(rows: &mut Vec<R>, incoming: Vec<R>) {
    let mut index: BTreeMap<R::Key, usize> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| (row.key(), i))
        .collect();

    for record in incoming {
        match index.get(&record.key()) {
            Some(&i) => rows[i] = record,
            None => {
                index.insert(record.key(), rows.len());
                rows.push(record);
            }
        }
    }
}

fn watch_stream<R>(rx: watch::Receiver<Vec<R>>) -> BoxStream<'static, Vec<R>>
where
    R: Clone + Send + Sync + 'static,
{
    stream::unfold((rx, true), |(mut rx, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let current = rx.borrow_and_update().clone();
        Some((current, (rx, false)))
    })
    .boxed()
}

// ─── In-memory store ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct MemoryStore<R> {
    tx: watch::Sender<Vec<R>>,
}

impl<R> MemoryStore<R>
where
    R: Keyed + Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    pub fn with_records(records: Vec<R>) -> Self {
        let (tx, _rx) = watch::channel(records);
        Self { tx }
    }

    pub fn snapshot(&self) -> Vec<R> {
        self.tx.borrow().clone()
    }

    /// Open change streams.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<R> Default for MemoryStore<R>
where
    R: Keyed + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R> LocalStore<R> for MemoryStore<R>
where
    R: Keyed + Clone + Send + Sync + 'static,
{
    async fn insert(&self, records: RecordList<R>) -> Result<(), StoreError> {
        self.tx.send_modify(|rows| upsert(rows, records));
        Ok(())
    }

    fn listen(&self) -> BoxStream<'static, RecordList<R>> {
        watch_stream(self.tx.subscribe())
    }
}

// ─── JSON snapshot file store ─────────────────────────────────────────────────

/// Keeps the whole collection in one pretty-printed JSON file.
///
/// Writes go to `<file>.tmp` and are renamed over the snapshot, so a crash
/// mid-write leaves the previous snapshot intact.
#[derive(Debug)]
pub struct JsonFileStore<R> {
    path: PathBuf,
    tx: watch::Sender<Vec<R>>,
    write_guard: Mutex<()>,
}

impl<R> JsonFileStore<R>
where
    R: Keyed + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Load the snapshot at `path`; a missing file is an empty collection.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            Vec::new()
        };
        tracing::debug!(path = %path.display(), rows = records.len(), "opened json store");

        let (tx, _rx) = watch::channel(records);
        Ok(Self {
            path,
            tx,
            write_guard: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Vec<R> {
        self.tx.borrow().clone()
    }

    async fn persist(&self, rows: &[R]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_json::to_vec_pretty(rows)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl<R> LocalStore<R> for JsonFileStore<R>
where
    R: Keyed + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn insert(&self, records: RecordList<R>) -> Result<(), StoreError> {
        let _guard = self.write_guard.lock().await;
        let mut rows = self.snapshot();
        upsert(&mut rows, records);
        self.persist(&rows).await?;
        tracing::debug!(path = %self.path.display(), rows = rows.len(), "json store written");
        self.tx.send_replace(rows);
        Ok(())
    }

    fn listen(&self) -> BoxStream<'static, RecordList<R>> {
        watch_stream(self.tx.subscribe())
    }
}
