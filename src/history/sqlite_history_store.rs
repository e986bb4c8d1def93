use super::{HistoryItem, HistoryStore};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub const MAX_HISTORY_ENTRIES: usize = 10_000;
/// Entries removed at once when the store is full.
pub const EVICTION_BATCH: usize = MAX_HISTORY_ENTRIES / 20;

const SCHEMA_VERSION: i64 = 1;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS download_history (
    id TEXT PRIMARY KEY,
    track_id TEXT NOT NULL,
    title TEXT NOT NULL,
    artists TEXT NOT NULL,
    album TEXT NOT NULL,
    cover_url TEXT NOT NULL,
    quality TEXT NOT NULL,
    format TEXT NOT NULL,
    path TEXT NOT NULL,
    timestamp INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_download_history_timestamp ON download_history(timestamp);";

/// SQLite-backed history. Opened once by the caller and closed explicitly
/// with [`SqliteHistoryStore::close`].
pub struct SqliteHistoryStore {
    conn: Arc<Mutex<Connection>>,
    capacity: usize,
}

impl SqliteHistoryStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::open_with_capacity(db_path, MAX_HISTORY_ENTRIES)
    }

    pub fn open_with_capacity<P: AsRef<Path>>(db_path: P, capacity: usize) -> Result<Self> {
        let path = db_path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create history directory {:?}", parent))?;
        }

        let is_new_db = !path.exists();
        let conn = Connection::open(path).context("Failed to open history database")?;
        if is_new_db {
            info!("Creating new history database at {:?}", path);
        }

        let version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            anyhow::bail!(
                "History database version {} is newer than supported version {}",
                version,
                SCHEMA_VERSION
            );
        }
        conn.execute_batch(CREATE_TABLE)
            .context("Failed to create history schema")?;
        conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            capacity: capacity.max(1),
        })
    }

    /// Close the underlying database. Fails if the store is still shared.
    pub fn close(self) -> Result<()> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| anyhow!("History store is still in use"))?
            .into_inner()
            .map_err(|_| anyhow!("History store lock poisoned"))?;
        conn.close()
            .map_err(|(_, e)| e)
            .context("Failed to close history database")
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("History store lock poisoned"))
    }

    fn eviction_batch(&self) -> usize {
        (self.capacity / 20).max(1)
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<HistoryItem> {
        Ok(HistoryItem {
            id: row.get("id")?,
            track_id: row.get("track_id")?,
            title: row.get("title")?,
            artists: row.get("artists")?,
            album: row.get("album")?,
            cover_url: row.get("cover_url")?,
            quality: row.get("quality")?,
            format: row.get("format")?,
            path: row.get("path")?,
            timestamp: row.get("timestamp")?,
        })
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn add(&self, item: &HistoryItem) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let count: i64 = tx.query_row("SELECT COUNT(*) FROM download_history", [], |row| {
            row.get(0)
        })?;
        if count as usize >= self.capacity {
            let evicted = tx.execute(
                "DELETE FROM download_history WHERE id IN (
                    SELECT id FROM download_history ORDER BY timestamp ASC, rowid ASC LIMIT ?1
                )",
                params![self.eviction_batch() as i64],
            )?;
            debug!("Evicted {} oldest history entries", evicted);
        }

        tx.execute(
            "INSERT OR REPLACE INTO download_history
                (id, track_id, title, artists, album, cover_url, quality, format, path, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                item.id,
                item.track_id,
                item.title,
                item.artists,
                item.album,
                item.cover_url,
                item.quality,
                item.format,
                item.path,
                item.timestamp,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<HistoryItem>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM download_history ORDER BY timestamp DESC, rowid DESC",
        )?;
        let items = stmt
            .query_map([], Self::row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM download_history WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM download_history", [])?;
        Ok(())
    }
}
