//! booksync: keep a local book collection in step with a remote API.
//!
//!   booksync sync  --remote <url> --store <file>   → one refresh, print the list
//!   booksync watch --remote <url> --store <file>   → print every change until Ctrl-C

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use booksync::config::{Overrides, Settings};
use booksync::logging::{self, DiagnosticsReceiver, LogEvent};
use booksync::{
    Book, Contexts, DeliveryDispatcher, HttpBookApi, JsonFileStore, RefreshState, Synchronizer,
};

// ─── Help text ────────────────────────────────────────────────────────────────

const AFTER_HELP: &str = "\
ENVIRONMENT:
    BOOKSYNC_REMOTE         Base URL of the book API (GET <url>/books)
    BOOKSYNC_STORE          Path of the local JSON snapshot

CONFIG FILE (--config):
    remote_url, store_path, request_timeout_secs, network_threads,
    storage_threads, log_level, log_format

EXAMPLES:
    booksync sync --remote https://books.example.com/api --store books.json
    booksync watch --remote https://books.example.com/api --store books.json --refresh-every 60
    BOOKSYNC_REMOTE=https://books.example.com/api booksync sync --store books.json
    booksync --config booksync.toml sync --json";

// ─── CLI definition ───────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "booksync",
    about = "booksync: observe a local book collection, refresh it from a remote API",
    after_help = AFTER_HELP,
    disable_help_subcommand = true
)]
struct Cli {
    /// Settings file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh once from the remote and print the local collection
    Sync {
        /// Base URL of the book API
        #[arg(long, env = "BOOKSYNC_REMOTE")]
        remote: Option<String>,
        /// Local JSON snapshot path
        #[arg(long, env = "BOOKSYNC_STORE")]
        store: Option<PathBuf>,
        /// Print the collection as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the local collection every time it changes
    Watch {
        /// Base URL of the book API
        #[arg(long, env = "BOOKSYNC_REMOTE")]
        remote: Option<String>,
        /// Local JSON snapshot path
        #[arg(long, env = "BOOKSYNC_STORE")]
        store: Option<PathBuf>,
        /// Refresh again every N seconds (default: only at startup)
        #[arg(long)]
        refresh_every: Option<u64>,
    },
}

// ─── Dispatch ─────────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    let cli = Cli::parse();

    let (remote, store) = match &cli.command {
        Commands::Sync { remote, store, .. } | Commands::Watch { remote, store, .. } => {
            (remote.clone(), store.clone())
        }
    };
    let overrides = Overrides {
        remote_url: remote,
        store_path: store,
        log_level: cli.log_level.clone(),
        log_format: cli.log_format.clone(),
    };
    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings.apply(overrides),
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let diagnostics = match logging::init(&settings.log_level, &settings.log_format) {
        Ok(diagnostics) => diagnostics,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Sync { json, .. } => run_sync(&settings, json, diagnostics),
        Commands::Watch { refresh_every, .. } => run_watch(&settings, refresh_every, diagnostics),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

// ─── Wiring ───────────────────────────────────────────────────────────────────

struct Wired {
    sync: &'static Synchronizer<Book>,
    store: Arc<JsonFileStore<Book>>,
}

fn wire(settings: &Settings) -> Result<Wired> {
    let remote_url = settings.remote_url()?;
    let store_path = settings.store_path()?;

    let remote = HttpBookApi::new(remote_url, settings.request_timeout())
        .context("cannot build HTTP client")?;
    let store = Arc::new(
        JsonFileStore::<Book>::open(store_path)
            .with_context(|| format!("cannot open store {}", store_path.display()))?,
    );
    let delivery =
        DeliveryDispatcher::spawn("booksync-delivery").context("cannot start delivery thread")?;
    let contexts = Contexts::worker_pools(settings.network_threads, settings.storage_threads)
        .context("cannot start worker pools")?;

    tracing::info!(remote = %remote.url(), store = %store.path().display(), "booksync ready");
    let sync = Synchronizer::get_instance(
        Arc::new(remote),
        store.clone(),
        Arc::new(delivery),
        contexts,
    );
    Ok(Wired { sync, store })
}

fn driver_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("cannot build runtime")
}

// ─── Sync mode ────────────────────────────────────────────────────────────────

fn run_sync(settings: &Settings, json: bool, mut diagnostics: DiagnosticsReceiver) -> Result<ExitCode> {
    let wired = wire(settings)?;
    let rt = driver_runtime()?;

    let state = rt.block_on(wired.sync.refresh_and_wait());
    let books = wired.store.snapshot();

    if json {
        println!("{}", serde_json::to_string_pretty(&books)?);
    } else {
        for book in &books {
            println!("{book}");
        }
        println!("{}", summary_line(&books));
    }

    if state == RefreshState::Failed {
        let cause = diagnostics
            .drain()
            .iter()
            .rev()
            .find(|event| event.is_refresh_failure())
            .map(failure_cause)
            .unwrap_or_else(|| "unknown cause".to_string());
        eprintln!("error: refresh failed: {cause}");
        eprintln!("showing last stored collection");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

// ─── Watch mode ───────────────────────────────────────────────────────────────

fn run_watch(
    settings: &Settings,
    refresh_every: Option<u64>,
    diagnostics: DiagnosticsReceiver,
) -> Result<ExitCode> {
    let wired = wire(settings)?;
    let rt = driver_runtime()?;
    rt.block_on(watch_loop(wired.sync, refresh_every, diagnostics))?;
    Ok(ExitCode::SUCCESS)
}

async fn watch_loop(
    sync: &'static Synchronizer<Book>,
    refresh_every: Option<u64>,
    mut diagnostics: DiagnosticsReceiver,
) -> Result<()> {
    let mut updates = sync.subscribe_to_local_updates().subscribe();
    sync.refresh();

    let mut ticker = refresh_every.map(|secs| {
        let period = Duration::from_secs(secs.max(1));
        tokio::time::interval_at(tokio::time::Instant::now() + period, period)
    });

    let mut diagnostics_open = true;
    eprintln!("watching local books...");

    loop {
        tokio::select! {
            books = updates.recv() => {
                match books {
                    Some(books) => println!("{}", summary_line(&books)),
                    None => break,
                }
            }
            failure = diagnostics.next_refresh_failure(), if diagnostics_open => {
                match failure {
                    Some(event) => eprintln!("refresh failed: {}", failure_cause(&event)),
                    None => diagnostics_open = false,
                }
            }
            _ = next_tick(&mut ticker) => sync.refresh(),
            signal = tokio::signal::ctrl_c() => {
                signal.context("cannot listen for Ctrl-C")?;
                break;
            }
        }
    }

    Ok(())
}

async fn next_tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn failure_cause(event: &LogEvent) -> String {
    event.field("error").unwrap_or("unknown cause").to_string()
}

fn summary_line(books: &[Book]) -> String {
    let ids: Vec<String> = books.iter().map(|b| b.id.to_string()).collect();
    format!("books={} ids={}", books.len(), ids.join(","))
}
