//! SQLite-backed ordered key-value store.
//!
//! Every namespace lives in one `kv` table keyed by `(namespace, key)`. Keys
//! are bound as BLOBs, which SQLite compares with `memcmp`, so `ORDER BY key`
//! is exactly the lexicographic byte order checksums depend on.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use crate::kv::{KvPair, Namespace, OrderedKeyValueStore, WriteBatch, prefix_upper_bound};
use crate::locks::KeyLocks;
use crate::secure_fs::prepare_db_file;

pub struct SqliteStore {
    db: Mutex<Connection>,
    path: Option<PathBuf>,
    locks: KeyLocks,
}

impl SqliteStore {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS kv (
            namespace TEXT NOT NULL,
            key BLOB NOT NULL,
            value BLOB NOT NULL,
            PRIMARY KEY (namespace, key)
        ) WITHOUT ROWID;
    ";

    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        prepare_db_file(path)?;

        let db = Connection::open(path)
            .with_context(|| format!("Failed to open ledger store at {}", path.display()))?;
        let store = Self::initialize(db, Some(path.to_path_buf()))?;
        tracing::info!(path = %path.display(), "Opened SQLite ledger store");
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory ledger store")?;
        Self::initialize(db, None)
    }

    fn initialize(db: Connection, path: Option<PathBuf>) -> Result<Self> {
        db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")
            .context("Failed to set ledger store pragmas")?;
        db.execute_batch(Self::SCHEMA)
            .context("Failed to create ledger store schema")?;
        Ok(Self {
            db: Mutex::new(db),
            path,
            locks: KeyLocks::new(),
        })
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OrderedKeyValueStore for SqliteStore {
    fn get(&self, namespace: Namespace, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.conn()
            .query_row(
                "SELECT value FROM kv WHERE namespace = ?1 AND key = ?2",
                params![namespace.as_str(), key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()
            .with_context(|| format!("Failed to read {namespace} row"))
    }

    fn scan_prefix(&self, namespace: Namespace, prefix: &[u8]) -> Result<Vec<KvPair>> {
        let conn = self.conn();
        let mut rows = Vec::new();
        let mut collect = |row: &rusqlite::Row<'_>| -> rusqlite::Result<()> {
            let key: Vec<u8> = row.get(0)?;
            let value: Vec<u8> = row.get(1)?;
            if key.starts_with(prefix) {
                rows.push((key, value));
            }
            Ok(())
        };

        if let Some(upper) = prefix_upper_bound(prefix) {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT key, value FROM kv
                     WHERE namespace = ?1 AND key >= ?2 AND key < ?3
                     ORDER BY key ASC",
                )
                .context("Failed to prepare bounded prefix scan")?;
            let mut cursor = stmt
                .query(params![namespace.as_str(), prefix, upper])
                .with_context(|| format!("Failed to scan {namespace}"))?;
            while let Some(row) = cursor.next().context("Failed to step prefix scan")? {
                collect(row).context("Failed to read scanned row")?;
            }
        } else {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT key, value FROM kv
                     WHERE namespace = ?1 AND key >= ?2
                     ORDER BY key ASC",
                )
                .context("Failed to prepare open prefix scan")?;
            let mut cursor = stmt
                .query(params![namespace.as_str(), prefix])
                .with_context(|| format!("Failed to scan {namespace}"))?;
            while let Some(row) = cursor.next().context("Failed to step prefix scan")? {
                collect(row).context("Failed to read scanned row")?;
            }
        }

        Ok(rows)
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .context("Failed to start ledger write transaction")?;
        for (namespace, key, value) in batch.iter() {
            tx.execute(
                "INSERT INTO kv (namespace, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value",
                params![namespace.as_str(), key, value],
            )
            .with_context(|| format!("Failed to write {namespace} row"))?;
        }
        tx.commit().context("Failed to commit ledger write batch")
    }

    fn key_locks(&self) -> &KeyLocks {
        &self.locks
    }
}
