//! booksync: observe a local book collection, refresh it from a remote API.
//!
//! The [`repository::Synchronizer`] glues its collaborators together:
//!   remote source  → `GET /books`, run on the network context
//!   local store    → insert-or-replace + change stream, run on the storage context
//!   delivery       → serial context that hands emissions to subscribers
//!
//! Subscribers see a deduplicated, replay-latest, multicast stream of the
//! local collection. `refresh()` never reports errors to its caller; failures
//! end up as a diagnostic log record under [`repository::LOG_TARGET`].

pub mod config;
pub mod error;
pub mod executor;
pub mod feed;
pub mod logging;
pub mod record;
pub mod remote;
pub mod repository;
pub mod store;

pub use error::{RemoteError, StoreError, SyncError};
pub use executor::{Contexts, DeliveryDispatcher, Executor, InlineExecutor, RuntimeExecutor, WorkerPool};
pub use feed::{LiveFeed, Subscription};
pub use record::{Book, Keyed, RecordList};
pub use remote::{HttpBookApi, RemoteSource};
pub use repository::{RefreshState, Synchronizer};
pub use store::{JsonFileStore, LocalStore, MemoryStore};
