//! Remote source of records.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::RemoteError;
use crate::record::{Book, RecordList};

const BOOKS_PATH: &str = "books";
const USER_AGENT: &str = concat!("booksync/", env!("CARGO_PKG_VERSION"));

/// Network-backed provider of the full record list.
///
/// `Ok(None)` means the source answered without a list (no content);
/// callers treat it as "nothing to store".
#[async_trait]
pub trait RemoteSource<R>: Send + Sync {
    async fn get_all(&self) -> Result<Option<RecordList<R>>, RemoteError>;
}

/// `GET {base_url}/books` returning a JSON array of [`Book`].
#[derive(Debug, Clone)]
pub struct HttpBookApi {
    client: reqwest::Client,
    url: String,
}

impl HttpBookApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let url = books_url(base_url);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| RemoteError::Transport {
                url: url.clone(),
                source,
            })?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn books_url(base_url: &str) -> String {
    format!("{}/{BOOKS_PATH}", base_url.trim_end_matches('/'))
}

#[async_trait]
impl RemoteSource<Book> for HttpBookApi {
    async fn get_all(&self) -> Result<Option<RecordList<Book>>, RemoteError> {
        tracing::debug!(url = %self.url, "fetching books");
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| RemoteError::Transport {
                url: self.url.clone(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(RemoteError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|source| RemoteError::Transport {
            url: self.url.clone(),
            source,
        })?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        // A JSON `null` body decodes to None, same as 204.
        serde_json::from_slice::<Option<Vec<Book>>>(&body).map_err(|e| RemoteError::Decode {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }
}
