//! Error taxonomy for the refresh pipeline.
//!
//! None of these reach the caller of `Synchronizer::refresh`; they are
//! logged by the pipeline's top-level handler and dropped.

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },
    #[error("cannot decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
    /// Failure raised by a non-HTTP remote source.
    #[error("remote source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Failure raised by a custom store backend.
    #[error("write rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("remote fetch failed: {0}")]
    Remote(#[from] RemoteError),
    #[error("storage write failed: {0}")]
    Storage(#[from] StoreError),
    /// The storage context dropped the write task before it ran.
    #[error("storage context dropped the write task")]
    StorageAbandoned,
}
