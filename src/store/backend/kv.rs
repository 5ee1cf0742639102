//! Embedded key-value record storage
//!
//! Uses three `sled` trees:
//!
//! - `drafts`: draft id → encoded record
//! - `sessions`: `<owner>/<draft id>` → empty, the per-owner index
//! - `quarantine`: draft id → bytes of records that failed to decode
//!
//! `sled` inserts are atomic per key, and create/delete update the record and
//! its index entry in a single multi-tree transaction.

use crate::error::{MetadraftError, Result};
use crate::store::backend::{RawRecord, RecordStore};
use crate::store::record::{DraftId, OwnerKey};
use sled::transaction::{ConflictableTransactionResult, TransactionError, Transactional};
use sled::{Db, Tree};
use std::path::Path;

/// `sled`-backed [`RecordStore`].
#[derive(Debug, Clone)]
pub struct SledRecordStore {
    db: Db,
    drafts: Tree,
    sessions: Tree,
    quarantine: Tree,
}

fn sled_err(action: &str, e: impl std::fmt::Display) -> anyhow::Error {
    MetadraftError::Storage(format!("{} failed: {}", action, e)).into()
}

fn tx_err(action: &str, e: TransactionError<()>) -> anyhow::Error {
    match e {
        TransactionError::Storage(inner) => sled_err(action, inner),
        TransactionError::Abort(()) => sled_err(action, "transaction aborted"),
    }
}

fn index_key(owner: &OwnerKey, id: &DraftId) -> String {
    format!("{}/{}", owner.as_str(), id)
}

impl SledRecordStore {
    /// Open or create a store at `path`
    ///
    /// # Errors
    ///
    /// Returns `MetadraftError::Storage` if the database cannot be opened
    ///
    /// # Examples
    ///
    /// ```
    /// use metadraft::store::backend::SledRecordStore;
    ///
    /// # fn main() -> metadraft::error::Result<()> {
    /// let dir = tempfile::tempdir()?;
    /// let store = SledRecordStore::open(dir.path().join("drafts.sled"))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path).map_err(|e| sled_err("Open database", e))?;
        let drafts = db.open_tree("drafts").map_err(|e| sled_err("Open tree", e))?;
        let sessions = db.open_tree("sessions").map_err(|e| sled_err("Open tree", e))?;
        let quarantine = db
            .open_tree("quarantine")
            .map_err(|e| sled_err("Open tree", e))?;
        Ok(Self {
            db,
            drafts,
            sessions,
            quarantine,
        })
    }

    fn flush(&self) -> Result<()> {
        self.db.flush().map_err(|e| sled_err("Flush", e))?;
        Ok(())
    }

    /// Number of quarantined records.
    pub fn quarantined(&self) -> usize {
        self.quarantine.len()
    }
}

impl RecordStore for SledRecordStore {
    fn put(&self, owner: &OwnerKey, id: &DraftId, bytes: &[u8]) -> Result<()> {
        let key = id.to_string();
        let index = index_key(owner, id);

        (&self.drafts, &self.sessions)
            .transaction(|(drafts, sessions)| -> ConflictableTransactionResult<(), ()> {
                drafts.insert(key.as_bytes(), bytes)?;
                sessions.insert(index.as_bytes(), &[] as &[u8])?;
                Ok(())
            })
            .map_err(|e| tx_err("Insert", e))?;

        self.flush()
    }

    fn fetch(&self, id: &DraftId) -> Result<Option<Vec<u8>>> {
        Ok(self
            .drafts
            .get(id.to_string().as_bytes())
            .map_err(|e| sled_err("Get", e))?
            .map(|bytes| bytes.to_vec()))
    }

    fn remove(&self, owner: &OwnerKey, id: &DraftId) -> Result<bool> {
        let key = id.to_string();
        let index = index_key(owner, id);

        let existed = (&self.drafts, &self.sessions)
            .transaction(|(drafts, sessions)| -> ConflictableTransactionResult<bool, ()> {
                let old = drafts.remove(key.as_bytes())?;
                sessions.remove(index.as_bytes())?;
                Ok(old.is_some())
            })
            .map_err(|e| tx_err("Remove", e))?;

        self.flush()?;
        Ok(existed)
    }

    fn scan_owner(&self, owner: &OwnerKey) -> Result<Vec<RawRecord>> {
        let prefix = format!("{}/", owner.as_str());
        let mut records = Vec::new();

        for entry in self.sessions.scan_prefix(prefix.as_bytes()) {
            let (key, _) = match entry {
                Ok(kv) => kv,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable index entry");
                    continue;
                }
            };
            let id = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            // Index entries can briefly outlive a concurrently deleted record.
            if let Some(bytes) = self.drafts.get(id.as_bytes()).map_err(|e| sled_err("Get", e))? {
                records.push(RawRecord {
                    locator: id,
                    bytes: bytes.to_vec(),
                });
            }
        }
        Ok(records)
    }

    fn scan_all(&self) -> Result<Vec<RawRecord>> {
        let mut records = Vec::new();
        for entry in self.drafts.iter() {
            match entry {
                Ok((key, bytes)) => records.push(RawRecord {
                    locator: String::from_utf8_lossy(&key).into_owned(),
                    bytes: bytes.to_vec(),
                }),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable draft entry"),
            }
        }
        Ok(records)
    }

    fn quarantine(&self, locator: &str) -> Result<()> {
        let Some(bytes) = self
            .drafts
            .remove(locator.as_bytes())
            .map_err(|e| sled_err("Remove", e))?
        else {
            return Ok(());
        };
        self.quarantine
            .insert(locator.as_bytes(), bytes)
            .map_err(|e| sled_err("Insert", e))?;

        let suffix = format!("/{}", locator);
        let stale: Vec<_> = self
            .sessions
            .iter()
            .keys()
            .filter_map(|k| k.ok())
            .filter(|k| k.ends_with(suffix.as_bytes()))
            .collect();
        for key in stale {
            self.sessions.remove(key).map_err(|e| sled_err("Remove", e))?;
        }
        self.flush()
    }

    fn name(&self) -> &'static str {
        "sled"
    }
}
