//! Bounded log of completed downloads.

mod models;
mod sqlite_history_store;

pub use models::HistoryItem;
pub use sqlite_history_store::{SqliteHistoryStore, EVICTION_BATCH, MAX_HISTORY_ENTRIES};

use anyhow::Result;

pub trait HistoryStore: Send + Sync {
    /// Append an entry, evicting the oldest ones when the store is full.
    fn add(&self, item: &HistoryItem) -> Result<()>;
    /// All entries, newest first.
    fn list(&self) -> Result<Vec<HistoryItem>>;
    /// Returns whether an entry with that id existed.
    fn delete(&self, id: &str) -> Result<bool>;
    fn clear(&self) -> Result<()>;
}
