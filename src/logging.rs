//! Tracing setup and the diagnostics tap.
//!
//! One registry feeds two sinks: formatted output on stderr, and a broadcast
//! channel of [`LogEvent`]s. The CLI reads the channel to report failed
//! refreshes to the user; embedders and tests use it to observe what the
//! synchronizer logged without scraping text.

use std::collections::BTreeMap;
use std::fmt as stdfmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Metadata, Subscriber};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, Registry};

use crate::repository::{FAILURE_MESSAGE, LOG_TARGET};

const CRATE_TARGET: &str = "booksync";
const DIAGNOSTICS_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("unknown log level {0:?} (expected trace, debug, info, warn, error or off)")]
    Level(String),
    #[error("unknown log format {0:?} (expected text or json)")]
    Format(String),
    #[error("cannot install tracing subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(LoggingError::Format(s.to_string())),
        }
    }
}

pub fn parse_level(level: &str) -> Result<LevelFilter, LoggingError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "off" => Ok(LevelFilter::OFF),
        "error" => Ok(LevelFilter::ERROR),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "info" => Ok(LevelFilter::INFO),
        "debug" => Ok(LevelFilter::DEBUG),
        "trace" => Ok(LevelFilter::TRACE),
        _ => Err(LoggingError::Level(level.to_string())),
    }
}

/// Install the process-wide subscriber. `level` applies to booksync's own
/// targets on stderr; other crates only show warnings and errors. The
/// diagnostics tap is unfiltered by `level`.
pub fn init(level: &str, format: &str) -> Result<DiagnosticsReceiver, LoggingError> {
    let level = parse_level(level)?;
    let format: LogFormat = format.parse()?;

    let stderr: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Text => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .boxed(),
    };

    let (diagnostics, receiver) = DiagnosticsLayer::channel();
    tracing_subscriber::registry()
        .with(stderr.with_filter(stderr_filter(level)))
        .with(diagnostics)
        .try_init()?;
    Ok(receiver)
}

fn stderr_filter(level: LevelFilter) -> Targets {
    Targets::new()
        .with_target(CRATE_TARGET, level)
        .with_default(LevelFilter::WARN)
}

// ─── Diagnostics tap ──────────────────────────────────────────────────────────

/// One event as seen through the diagnostics tap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub unix_secs: u64,
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

impl LogEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// The record the synchronizer emits when a refresh fails.
    pub fn is_refresh_failure(&self) -> bool {
        self.target == LOG_TARGET && self.message == FAILURE_MESSAGE
    }
}

/// Copies booksync events of any level, and warnings or errors from other
/// crates, into a broadcast channel. Events sent while nobody listens are
/// dropped.
pub struct DiagnosticsLayer {
    tx: broadcast::Sender<LogEvent>,
}

impl DiagnosticsLayer {
    pub fn channel() -> (Self, DiagnosticsReceiver) {
        let (tx, rx) = broadcast::channel(DIAGNOSTICS_CAPACITY);
        (Self { tx }, DiagnosticsReceiver { rx })
    }

    fn forwards(metadata: &Metadata<'_>) -> bool {
        metadata.target().starts_with(CRATE_TARGET) || *metadata.level() <= Level::WARN
    }
}

impl<S: Subscriber> Layer<S> for DiagnosticsLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !Self::forwards(metadata) {
            return;
        }

        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        let _ = self.tx.send(LogEvent {
            unix_secs: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            level: *metadata.level(),
            target: metadata.target().to_string(),
            message: collector.message.unwrap_or_default(),
            fields: collector.fields,
        });
    }
}

/// Receiving end of a [`DiagnosticsLayer`]. Falls behind silently: when more
/// than the channel capacity is queued, the oldest events are lost.
pub struct DiagnosticsReceiver {
    rx: broadcast::Receiver<LogEvent>,
}

impl DiagnosticsReceiver {
    /// Events queued so far, oldest first.
    pub fn drain(&mut self) -> Vec<LogEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => return events,
            }
        }
    }

    /// Wait for the next failed refresh. `None` once the layer is gone.
    pub async fn next_refresh_failure(&mut self) -> Option<LogEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.is_refresh_failure() => return Some(event),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: BTreeMap<String, String>,
}

impl FieldCollector {
    fn insert(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            name => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn stdfmt::Debug) {
        self.insert(field, format!("{value:?}"));
    }
}
