pub mod error;
pub mod migrations;
pub mod models;
mod queries;
pub mod retry;
pub mod store;

use anyhow::Result;
use marathon_types::{LedgerError, LedgerResult};
use rusqlite::{Connection, OpenFlags, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

use crate::error::SqlResultExt;

pub use retry::RetryPolicy;
pub use store::SqliteStore;

const READER_POOL_SIZE: usize = 4;

/// Short enough that a locked database surfaces to the retry wrapper
/// instead of stalling a worker thread.
const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// SQLite handle: one writer connection plus a pool of read-only readers.
///
/// All writes are serialized through the writer inside `IMMEDIATE`
/// transactions; readers see WAL snapshots.
pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let writer = Connection::open(path)?;

        // WAL mode for concurrent reads
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;
        writer.busy_timeout(BUSY_TIMEOUT)?;

        migrations::run(&writer)?;

        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            readers.push(Mutex::new(conn));
        }

        info!(
            "Database opened at {} (1 writer + {} readers)",
            path.display(),
            READER_POOL_SIZE
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
        })
    }

    /// Run `f` inside one `IMMEDIATE` transaction on the writer.
    ///
    /// Any error from `f`, and a `deadline` that passes before commit, roll the
    /// whole transaction back.
    pub fn write<F, T>(&self, op: &'static str, deadline: Option<Instant>, f: F) -> LedgerResult<T>
    where
        F: FnOnce(&Connection) -> LedgerResult<T>,
    {
        check_deadline(op, deadline)?;
        let mut conn = self
            .writer
            .lock()
            .map_err(|e| LedgerError::Fatal(format!("writer lock poisoned: {}", e)))?;

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .into_ledger()?;
        let value = f(&tx)?;
        check_deadline(op, deadline)?;
        tx.commit().into_ledger()?;
        Ok(value)
    }

    /// Run `f` inside a deferred transaction on a pooled reader so that every
    /// statement in `f` sees one snapshot.
    pub fn read<F, T>(&self, op: &'static str, deadline: Option<Instant>, f: F) -> LedgerResult<T>
    where
        F: FnOnce(&Connection) -> LedgerResult<T>,
    {
        check_deadline(op, deadline)?;
        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let mut conn = self.readers[idx]
            .lock()
            .map_err(|e| LedgerError::Fatal(format!("reader lock poisoned: {}", e)))?;

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .into_ledger()?;
        let value = f(&tx)?;
        tx.commit().into_ledger()?;
        Ok(value)
    }

    /// Raw access to the writer connection, outside any transaction.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .writer
            .lock()
            .map_err(|e| anyhow::anyhow!("Writer lock poisoned: {}", e))?;
        f(&conn)
    }
}

fn check_deadline(op: &'static str, deadline: Option<Instant>) -> LedgerResult<()> {
    match deadline {
        Some(d) if Instant::now() >= d => Err(LedgerError::DeadlineExceeded(op)),
        _ => Ok(()),
    }
}
