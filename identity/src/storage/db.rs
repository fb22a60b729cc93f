//! # IdentityDb: Transactional Record Store
//!
//! The persistence layer of the identity core, built on sled's embedded
//! key-value store. Every key, document and index record lives in a single
//! named tree, namespaced by string prefixes (see [`super::records`]).
//!
//! ## Transactions
//!
//! A [`DbTransaction`] is an isolated write overlay on top of the tree:
//!
//! ```text
//!   get/has ──► overlay hit? ──yes──► overlay value (or tombstone)
//!                   │ no
//!                   ▼
//!              sled tree
//!
//!   put/delete ──► overlay only
//!   commit     ──► one sled Batch, applied atomically, then flushed
//!   rollback   ──► overlay dropped
//! ```
//!
//! Nothing a transaction writes is visible outside it until commit, and a
//! commit lands either entirely or not at all. A transaction dropped while
//! still open is rolled back with a warning.
//!
//! Writers are not serialized against each other: two transactions that
//! touch the same record resolve last-commit-wins. Callers lock per account
//! when that matters.

use sled::{Batch, Db, Tree};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::config::IDENTITY_TREE;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("transaction failed: {0}")]
    Transaction(String),
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Record Access
// ---------------------------------------------------------------------------

/// Get/has/put/delete over string-keyed records.
///
/// Implemented by the store itself (direct, auto-committed writes) and by
/// [`DbTransaction`] (isolated writes), so record helpers work on either.
pub trait KvStore {
    fn get(&self, key: &str) -> DbResult<Option<Vec<u8>>>;

    fn has(&self, key: &str) -> DbResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn put(&mut self, key: &str, value: &[u8]) -> DbResult<()>;

    fn delete(&mut self, key: &str) -> DbResult<()>;
}

// ---------------------------------------------------------------------------
// IdentityDb
// ---------------------------------------------------------------------------

/// Persistent record store of the identity core.
///
/// # Thread Safety
///
/// sled handles are cheap to clone and safe to share. `IdentityDb` can be
/// cloned into every request or wrapped in `Arc` without external locking.
#[derive(Debug, Clone)]
pub struct IdentityDb {
    db: Db,
    records: Tree,
}

impl IdentityDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when the last handle is
    /// dropped.
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let records = db.open_tree(IDENTITY_TREE)?;
        Ok(Self { db, records })
    }

    /// Start a transaction over the record tree.
    pub fn begin(&self) -> DbTransaction {
        DbTransaction {
            db: self.db.clone(),
            records: self.records.clone(),
            writes: BTreeMap::new(),
            state: TxnState::Open,
        }
    }

    /// Run `f` inside a fresh transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`. A
    /// failed commit surfaces as `E::from(DbError::Transaction(..))`.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut DbTransaction) -> Result<T, E>,
        E: From<DbError>,
    {
        let mut txn = self.begin();
        match f(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                txn.rollback();
                Err(e)
            }
        }
    }

    /// All committed records whose key starts with `prefix`, in key order.
    pub fn scan_prefix(&self, prefix: &str) -> DbResult<Vec<(String, Vec<u8>)>> {
        let mut out = Vec::new();
        for entry in self.records.scan_prefix(prefix.as_bytes()) {
            let (key, value) = entry?;
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| DbError::Serialization(format!("non UTF-8 record key: {}", e)))?;
            out.push((key, value.to_vec()));
        }
        Ok(out)
    }

    /// Number of committed records.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Block until all pending writes are durable.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl KvStore for IdentityDb {
    fn get(&self, key: &str) -> DbResult<Option<Vec<u8>>> {
        Ok(self.records.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    fn has(&self, key: &str) -> DbResult<bool> {
        Ok(self.records.contains_key(key.as_bytes())?)
    }

    fn put(&mut self, key: &str, value: &[u8]) -> DbResult<()> {
        self.records.insert(key.as_bytes(), value)?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> DbResult<()> {
        self.records.remove(key.as_bytes())?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DbTransaction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxnState {
    Open,
    Committed,
    RolledBack,
}

/// An isolated write overlay over the record tree.
///
/// `commit` and `rollback` consume the transaction, so each is resolved
/// exactly once.
#[derive(Debug)]
pub struct DbTransaction {
    db: Db,
    records: Tree,
    /// Pending writes; `None` is a tombstone.
    writes: BTreeMap<String, Option<Vec<u8>>>,
    state: TxnState,
}

impl DbTransaction {
    /// Number of pending writes and deletes.
    pub fn pending(&self) -> usize {
        self.writes.len()
    }

    /// Apply every pending write in one atomic batch and flush.
    pub fn commit(mut self) -> DbResult<()> {
        let writes = std::mem::take(&mut self.writes);
        let count = writes.len();

        let mut batch = Batch::default();
        for (key, value) in writes {
            match value {
                Some(value) => batch.insert(key.as_bytes(), value),
                None => batch.remove(key.as_bytes()),
            }
        }

        // Mark resolved before touching sled so a failed commit is not
        // reported a second time on drop.
        self.state = TxnState::Committed;
        self.records
            .apply_batch(batch)
            .map_err(|e| DbError::Transaction(format!("commit of {} writes: {}", count, e)))?;
        self.db
            .flush()
            .map_err(|e| DbError::Transaction(format!("flush after commit: {}", e)))?;

        debug!(writes = count, "transaction committed");
        Ok(())
    }

    /// Discard every pending write.
    pub fn rollback(mut self) {
        let count = self.writes.len();
        self.writes.clear();
        self.state = TxnState::RolledBack;
        debug!(writes = count, "transaction rolled back");
    }
}

impl KvStore for DbTransaction {
    fn get(&self, key: &str) -> DbResult<Option<Vec<u8>>> {
        match self.writes.get(key) {
            Some(pending) => Ok(pending.clone()),
            None => Ok(self.records.get(key.as_bytes())?.map(|v| v.to_vec())),
        }
    }

    fn put(&mut self, key: &str, value: &[u8]) -> DbResult<()> {
        self.writes.insert(key.to_string(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &str) -> DbResult<()> {
        self.writes.insert(key.to_string(), None);
        Ok(())
    }
}

impl Drop for DbTransaction {
    fn drop(&mut self) {
        if self.state == TxnState::Open && !self.writes.is_empty() {
            warn!(
                writes = self.writes.len(),
                "transaction dropped without commit or rollback; discarding writes"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
