#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tracing_subscriber::prelude::*;

use booksync::logging::{DiagnosticsLayer, DiagnosticsReceiver, LogEvent};
use booksync::repository::LOG_TARGET;
use booksync::{
    Book, Contexts, InlineExecutor, LocalStore, MemoryStore, RecordList, RemoteError,
    RemoteSource, RuntimeExecutor, StoreError, Synchronizer,
};

pub fn booksync_bin() -> &'static str {
    env!("CARGO_BIN_EXE_booksync")
}

pub fn emma() -> Book {
    Book::new(1, "Emma", "Jane Austen")
}

pub fn dune() -> Book {
    let mut book = Book::new(2, "Dune", "Frank Herbert");
    book.published_year = Some(1965);
    book
}

pub fn ubik() -> Book {
    Book::new(3, "Ubik", "Philip K. Dick")
}

// ─── Fakes ────────────────────────────────────────────────────────────────────

/// Remote that answers from a script, then with `Ok(None)` once exhausted.
#[derive(Default)]
pub struct ScriptedRemote {
    responses: Mutex<VecDeque<Result<Option<Vec<Book>>, String>>>,
    calls: AtomicUsize,
}

impl ScriptedRemote {
    pub fn new(responses: Vec<Result<Option<Vec<Book>>, String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSource<Book> for ScriptedRemote {
    async fn get_all(&self) -> Result<Option<RecordList<Book>>, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(books)) => Ok(books),
            Some(Err(reason)) => Err(RemoteError::Unavailable(reason)),
            None => Ok(None),
        }
    }
}

/// Store whose writes always fail but which still reports its contents.
pub struct RejectingStore {
    inner: MemoryStore<Book>,
    attempts: AtomicUsize,
}

impl RejectingStore {
    pub fn new(records: Vec<Book>) -> Self {
        Self {
            inner: MemoryStore::with_records(records),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Vec<Book> {
        self.inner.snapshot()
    }
}

#[async_trait]
impl LocalStore<Book> for RejectingStore {
    async fn insert(&self, _records: RecordList<Book>) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Rejected("disk full".to_string()))
    }

    fn listen(&self) -> BoxStream<'static, RecordList<Book>> {
        self.inner.listen()
    }
}

// ─── Wiring ───────────────────────────────────────────────────────────────────

/// Network and storage on the test's own runtime, delivery inline.
pub fn runtime_contexts() -> Contexts {
    let rt = Arc::new(RuntimeExecutor::current().expect("inside a tokio runtime"));
    Contexts::new(rt.clone(), rt)
}

pub fn synchronizer(
    remote: Arc<dyn RemoteSource<Book>>,
    store: Arc<dyn LocalStore<Book>>,
) -> Synchronizer<Book> {
    Synchronizer::new(remote, store, Arc::new(InlineExecutor), runtime_contexts())
}

/// Let spawned tasks on a current-thread runtime run.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

// ─── Diagnostics capture ──────────────────────────────────────────────────────

/// Installs a thread-local subscriber forwarding to a channel.
pub struct Diagnostics {
    rx: DiagnosticsReceiver,
    _guard: tracing::subscriber::DefaultGuard,
}

impl Diagnostics {
    pub fn capture() -> Self {
        let (layer, rx) = DiagnosticsLayer::channel();
        let subscriber = tracing_subscriber::registry().with(layer);
        let guard = tracing::subscriber::set_default(subscriber);
        Self { rx, _guard: guard }
    }

    /// Info-or-louder records from the synchronizer so far.
    pub fn failures(&mut self) -> Vec<LogEvent> {
        self.rx
            .drain()
            .into_iter()
            .filter(|e| e.target == LOG_TARGET && e.level <= tracing::Level::INFO)
            .collect()
    }
}

// ─── HTTP stub ────────────────────────────────────────────────────────────────

/// Serve `count` identical HTTP responses on a random port from a thread.
pub fn serve_http(status_line: &'static str, body: String, count: usize) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind stub server");
    let addr = listener.local_addr().expect("stub addr");
    thread::spawn(move || {
        for _ in 0..count {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
    format!("http://{addr}")
}

/// An address nothing listens on.
pub fn dead_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}
