//! Previously-downloaded image store
//!
//! A file counts as previously downloaded when a file with the same name
//! (without path), size and modification time was downloaded before. EXIF
//! data is never checked. Records live in a SQLite table keyed by that
//! triple; writing an existing triple replaces the row.

use crate::core::error::Result;
use chrono::NaiveDateTime;
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

const TABLE_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS downloaded (
    file_name TEXT NOT NULL,
    mtime REAL NOT NULL,
    size INTEGER NOT NULL,
    download_name TEXT NOT NULL,
    download_datetime TEXT,
    PRIMARY KEY (file_name, mtime, size)
)";

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Identity of a source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileKey {
    /// File name without path
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Modification time, seconds since the Unix epoch
    pub mtime: f64,
}

impl FileKey {
    /// Read the key of a file on disk
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let mtime = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            name,
            size: metadata.len(),
            mtime,
        })
    }
}

/// Where and when a file was downloaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDownloaded {
    /// Downloaded file path, or "." when the user marked the file manually
    pub download_name: String,
    pub download_datetime: Option<NaiveDateTime>,
}

/// One row to record
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRecord {
    pub key: FileKey,
    pub download_name: String,
    pub download_datetime: NaiveDateTime,
}

/// Lookup and batched upsert of previously-downloaded files
pub trait DownloadedStore: Send {
    fn lookup(&self, key: &FileKey) -> Result<Option<FileDownloaded>>;

    /// Record files, replacing rows with an identical key; returns the row count
    fn upsert_many(&mut self, records: &[DownloadRecord]) -> Result<usize>;
}

/// SQLite-backed store
pub struct SqliteDownloadedStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteDownloadedStore {
    /// Open (or create) the database file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        debug!("Previously-downloaded database at {}", path.display());
        let store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// A throwaway in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute(TABLE_SCHEMA, [])?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS download_name_idx ON downloaded (download_name)",
            [],
        )?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Delete every record
    pub fn reset(&mut self) -> Result<()> {
        self.conn.execute("DROP TABLE IF EXISTS downloaded", [])?;
        self.conn.execute("VACUUM", [])?;
        self.init_schema()?;
        info!("Previously-downloaded database cleared");
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM downloaded", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl DownloadedStore for SqliteDownloadedStore {
    fn lookup(&self, key: &FileKey) -> Result<Option<FileDownloaded>> {
        let row = self
            .conn
            .query_row(
                "SELECT download_name, download_datetime FROM downloaded
                 WHERE file_name = ?1 AND size = ?2 AND mtime = ?3",
                params![key.name, key.size as i64, key.mtime],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?;

        Ok(row.map(|(download_name, datetime)| FileDownloaded {
            download_name,
            download_datetime: datetime
                .and_then(|d| NaiveDateTime::parse_from_str(&d, DATETIME_FORMAT).ok()),
        }))
    }

    fn upsert_many(&mut self, records: &[DownloadRecord]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut statement = tx.prepare(
                "INSERT OR REPLACE INTO downloaded
                 (file_name, size, mtime, download_name, download_datetime)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for record in records {
                statement.execute(params![
                    record.key.name,
                    record.key.size as i64,
                    record.key.mtime,
                    record.download_name,
                    record.download_datetime.format(DATETIME_FORMAT).to_string(),
                ])?;
            }
        }
        tx.commit()?;
        debug!("Added {} images to downloaded files", records.len());
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn key(name: &str) -> FileKey {
        FileKey {
            name: name.to_string(),
            size: 1024,
            mtime: 1_700_000_000.5,
        }
    }

    fn when() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_milli_opt(10, 0, 0, 250)
            .unwrap()
    }

    fn record(name: &str, download_name: &str) -> DownloadRecord {
        DownloadRecord {
            key: key(name),
            download_name: download_name.to_string(),
            download_datetime: when(),
        }
    }

    #[test]
    fn test_lookup_missing() {
        let store = SqliteDownloadedStore::open_in_memory().unwrap();
        assert_eq!(store.lookup(&key("a.jpg")).unwrap(), None);
    }

    #[test]
    fn test_upsert_and_lookup() {
        let mut store = SqliteDownloadedStore::open_in_memory().unwrap();
        store
            .upsert_many(&[record("a.jpg", "/photos/a.jpg"), record("b.jpg", "/photos/b.jpg")])
            .unwrap();

        let found = store.lookup(&key("a.jpg")).unwrap().unwrap();
        assert_eq!(found.download_name, "/photos/a.jpg");
        assert_eq!(found.download_datetime, Some(when()));

        let mut other = key("a.jpg");
        other.size = 2048;
        assert_eq!(store.lookup(&other).unwrap(), None);
    }

    #[test]
    fn test_identical_key_replaces() {
        let mut store = SqliteDownloadedStore::open_in_memory().unwrap();
        store.upsert_many(&[record("a.jpg", "/old/a.jpg")]).unwrap();
        store.upsert_many(&[record("a.jpg", "/new/a.jpg")]).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        let found = store.lookup(&key("a.jpg")).unwrap().unwrap();
        assert_eq!(found.download_name, "/new/a.jpg");
    }

    #[test]
    fn test_persists_across_open_and_reset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("downloaded.db");
        {
            let mut store = SqliteDownloadedStore::open(&path).unwrap();
            store.upsert_many(&[record("a.jpg", "/p/a.jpg")]).unwrap();
        }
        let mut store = SqliteDownloadedStore::open(&path).unwrap();
        assert!(store.lookup(&key("a.jpg")).unwrap().is_some());

        store.reset().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_file_key_from_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("IMG_1.JPG");
        fs::write(&path, b"12345").unwrap();
        let key = FileKey::from_path(&path).unwrap();
        assert_eq!(key.name, "IMG_1.JPG");
        assert_eq!(key.size, 5);
        assert!(key.mtime > 0.0);
    }
}
