//! SQLite connection pool with read/write separation.
//!
//! - Maintains a **write mutex** per DB for serialized in-process write access
//! - Creates fresh **read connections** per operation (no mutex, concurrent via WAL)
//! - Write transactions start with `BEGIN IMMEDIATE` so cross-process writers
//!   queue on the busy timeout instead of failing at commit
//!
//! Connections are not kept open between operations.

use crate::core::db;
use crate::core::error::FellowshipError;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

/// Read connection busy_timeout in seconds.
const READ_BUSY_TIMEOUT_SECS: u32 = 5;

/// Per-database entry holding a write mutex for serialized write access.
struct PoolEntry {
    write_lock: Mutex<()>,
    db_path: PathBuf,
}

pub struct SqlitePool {
    entries: Mutex<HashMap<PathBuf, &'static PoolEntry>>,
}

impl SqlitePool {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn get_entry(&self, db_path: &Path) -> Result<&'static PoolEntry, FellowshipError> {
        let canonical = db_path.to_path_buf();
        let mut entries = self.entries.lock().map_err(|_| {
            FellowshipError::DatabaseInitializationError(
                "SqlitePool entries lock poisoned".to_string(),
            )
        })?;
        if let Some(entry) = entries.get(&canonical) {
            return Ok(*entry);
        }
        let entry = Box::leak(Box::new(PoolEntry {
            write_lock: Mutex::new(()),
            db_path: canonical.clone(),
        }));
        entries.insert(canonical, entry);
        Ok(entry)
    }

    /// Execute a closure with a write connection for the given DB path.
    /// Write access is serialized per-DB via mutex.
    pub fn with_write<F, R>(
        &self,
        db_path: &Path,
        busy_timeout_secs: u32,
        f: F,
    ) -> Result<R, FellowshipError>
    where
        F: FnOnce(&Connection) -> Result<R, FellowshipError>,
    {
        let entry = self.get_entry(db_path)?;
        let _guard = entry.write_lock.lock().map_err(|_| {
            FellowshipError::DatabaseInitializationError("Pool write lock poisoned".to_string())
        })?;
        let conn = db::db_connect_pooled(&entry.db_path.to_string_lossy(), busy_timeout_secs)?;
        f(&conn)
    }

    /// Execute a closure inside one `BEGIN IMMEDIATE` transaction.
    ///
    /// The transaction commits only if the closure returns `Ok`; any error
    /// drops it, which rolls back every write the closure made.
    pub fn with_write_tx<F, R>(
        &self,
        db_path: &Path,
        busy_timeout_secs: u32,
        f: F,
    ) -> Result<R, FellowshipError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<R, FellowshipError>,
    {
        let entry = self.get_entry(db_path)?;
        let _guard = entry.write_lock.lock().map_err(|_| {
            FellowshipError::DatabaseInitializationError("Pool write lock poisoned".to_string())
        })?;
        let mut conn =
            db::db_connect_pooled(&entry.db_path.to_string_lossy(), busy_timeout_secs)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| FellowshipError::from_write(e, "transaction"))?;
        let result = f(&tx)?;
        tx.commit()
            .map_err(|e| FellowshipError::from_write(e, "transaction"))?;
        Ok(result)
    }

    /// Execute a closure with a read connection (no mutex serialization).
    /// WAL mode allows concurrent readers; they only ever see committed cascades.
    pub fn with_read<F, R>(&self, db_path: &Path, f: F) -> Result<R, FellowshipError>
    where
        F: FnOnce(&Connection) -> Result<R, FellowshipError>,
    {
        let conn = db::db_connect_pooled(&db_path.to_string_lossy(), READ_BUSY_TIMEOUT_SECS)?;
        f(&conn)
    }
}

/// Check if an error is a SQLite busy/locked error.
pub fn is_busy_error(err: &FellowshipError) -> bool {
    match err {
        FellowshipError::RusqliteError(rusqlite::Error::SqliteFailure(code, _)) => matches!(
            code.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}

/// Global pool instance (same lifetime as the process).
pub fn global_pool() -> &'static SqlitePool {
    static POOL: OnceLock<SqlitePool> = OnceLock::new();
    POOL.get_or_init(SqlitePool::new)
}
