//! Record types shared by the remote source, the local stores and the feed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered snapshot of the watched collection.
pub type RecordList<R> = Vec<R>;

/// Records that a store can insert-or-replace by key.
pub trait Keyed {
    type Key: Ord + Clone + Send + Sync + fmt::Debug;

    fn key(&self) -> Self::Key;
}

/// One book as served by the remote API and persisted locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: u64,
    pub title: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_year: Option<u16>,
}

impl Book {
    pub fn new(id: u64, title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            author: author.into(),
            isbn: None,
            published_year: None,
        }
    }
}

impl Keyed for Book {
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} by {}", self.id, self.title, self.author)?;
        if let Some(year) = self.published_year {
            write!(f, " ({year})")?;
        }
        Ok(())
    }
}
