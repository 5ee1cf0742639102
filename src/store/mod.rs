//! Session-scoped draft storage
//!
//! [`DraftStore`] owns every rule about drafts: ownership checks, wholesale
//! payload replacement, strictly increasing `updatedAt`, "latest" selection,
//! and retention sweeping. Physical persistence is delegated to a
//! [`RecordStore`] backend which only moves bytes.
//!
//! # Concurrency
//!
//! The store is shared process-wide behind an `Arc`. Writes to the same draft
//! id are serialized by a per-id lock so the read-check-write of an update
//! cannot interleave with another update or delete of that draft; different
//! drafts never contend. Readers do not lock: backends swap whole records
//! atomically, so a reader sees either the old or the new record.

use crate::clock::{Clock, SystemClock};
use crate::config::{StoreBackendKind, StoreConfig};
use crate::error::{kind_of, MetadraftError, Result};
use crate::payload::Document;
use chrono::{DateTime, Duration, Utc};
use metrics::{histogram, increment_counter};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub mod backend;
pub mod record;

pub use backend::{FsRecordStore, RawRecord, RecordStore, SledRecordStore};
pub use record::{DraftCreated, DraftId, DraftRecord, DraftUpdated, DraftView, OwnerKey, Timestamp};

/// Retention policy for the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Drafts created longer ago than this are purged by a sweep
    pub window: Duration,
    /// Minimum spacing between opportunistic sweeps
    pub sweep_interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            window: Duration::days(30),
            sweep_interval: Duration::minutes(5),
        }
    }
}

/// Outcome of a retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records examined
    pub scanned: usize,
    /// Expired drafts removed
    pub removed: usize,
    /// Unreadable records moved aside
    pub quarantined: usize,
}

/// Process-wide draft store.
#[derive(Debug)]
pub struct DraftStore {
    backend: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    retention: RetentionPolicy,
    locks: Mutex<HashMap<DraftId, Arc<Mutex<()>>>>,
    last_sweep: Mutex<Option<DateTime<Utc>>>,
}

impl DraftStore {
    /// Create a store over an existing backend.
    pub fn new(
        backend: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            backend,
            clock,
            retention,
            locks: Mutex::new(HashMap::new()),
            last_sweep: Mutex::new(None),
        }
    }

    /// Open the backend described by `config` with the system clock.
    ///
    /// # Errors
    ///
    /// Returns `MetadraftError::Storage` if the backend cannot be opened.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let backend: Arc<dyn RecordStore> = match config.backend {
            StoreBackendKind::Fs => Arc::new(FsRecordStore::open(&config.root)?),
            StoreBackendKind::Sled => Arc::new(SledRecordStore::open(&config.root)?),
        };
        tracing::info!(
            backend = backend.name(),
            root = %config.root.display(),
            retention_hours = config.retention_hours,
            "Opened draft store"
        );
        Ok(Self::new(
            backend,
            Arc::new(SystemClock),
            config.retention_policy(),
        ))
    }

    /// Backend in use.
    pub fn backend(&self) -> &Arc<dyn RecordStore> {
        &self.backend
    }

    /// Persist a new draft for `owner`.
    ///
    /// # Examples
    ///
    /// ```
    /// use metadraft::store::{DraftStore, FsRecordStore, OwnerKey, RetentionPolicy};
    /// use metadraft::clock::SystemClock;
    /// use metadraft::payload::Document;
    /// use std::sync::Arc;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let store = DraftStore::new(
    ///     Arc::new(FsRecordStore::open(dir.path()).unwrap()),
    ///     Arc::new(SystemClock),
    ///     RetentionPolicy::default(),
    /// );
    /// let owner = OwnerKey::from_credential("session-1");
    /// let created = store.create(&owner, Document::new()).unwrap();
    /// assert_eq!(store.get(&created.id.to_string(), &owner).unwrap().id, created.id);
    /// ```
    pub fn create(&self, owner: &OwnerKey, payload: Document) -> Result<DraftCreated> {
        let result = self.create_inner(owner, payload);
        observe("create", &result);
        self.maybe_sweep();
        result
    }

    fn create_inner(&self, owner: &OwnerKey, payload: Document) -> Result<DraftCreated> {
        let now = Timestamp::from_datetime(self.clock.now());
        let record = DraftRecord {
            id: DraftId::generate(),
            owner: owner.clone(),
            created_at: now.clone(),
            updated_at: now,
            checksum: payload.checksum(),
            payload,
        };
        self.write(&record)?;

        tracing::info!(
            draft_id = %record.id,
            owner = owner.short(),
            checksum = %record.checksum,
            "Draft created"
        );
        Ok(DraftCreated {
            id: record.id,
            updated_at: record.updated_at,
            checksum: record.checksum,
        })
    }

    /// Replace the payload of draft `id` wholesale.
    ///
    /// # Errors
    ///
    /// - `MetadraftError::NotFound` if `id` is unknown or malformed
    /// - `MetadraftError::Ownership` if `owner` does not own the draft
    pub fn update(&self, id: &str, owner: &OwnerKey, payload: Document) -> Result<DraftUpdated> {
        let result = self.update_inner(id, owner, payload);
        observe("update", &result);
        result
    }

    fn update_inner(&self, id: &str, owner: &OwnerKey, payload: Document) -> Result<DraftUpdated> {
        let id = parse_id(id)?;
        self.with_draft_lock(id, || {
            let current = self.load_owned(&id, owner)?;
            let record = DraftRecord {
                updated_at: Timestamp::next_after(&current.updated_at, self.clock.now()),
                checksum: payload.checksum(),
                payload,
                ..current
            };
            self.write(&record)?;

            tracing::debug!(draft_id = %id, checksum = %record.checksum, "Draft updated");
            Ok(DraftUpdated {
                checksum: record.checksum,
                updated_at: record.updated_at,
            })
        })
    }

    /// Fetch draft `id` for its owner.
    ///
    /// # Errors
    ///
    /// Same as [`DraftStore::update`], plus `MetadraftError::CorruptRecord`
    /// when the stored bytes cannot be decoded.
    pub fn get(&self, id: &str, owner: &OwnerKey) -> Result<DraftView> {
        let result = parse_id(id).and_then(|id| self.load_owned(&id, owner).map(|r| r.view()));
        observe("get", &result);
        result
    }

    /// Delete draft `id`.
    pub fn delete(&self, id: &str, owner: &OwnerKey) -> Result<()> {
        let result = self.delete_inner(id, owner);
        observe("delete", &result);
        result
    }

    fn delete_inner(&self, id: &str, owner: &OwnerKey) -> Result<()> {
        let id = parse_id(id)?;
        self.with_draft_lock(id, || {
            self.load_owned(&id, owner)?;
            if !self.backend.remove(owner, &id)? {
                return Err(MetadraftError::NotFound(id.to_string()).into());
            }
            tracing::info!(draft_id = %id, owner = owner.short(), "Draft deleted");
            Ok(())
        })
    }

    /// The owner's draft with the greatest embedded `updatedAt`.
    ///
    /// Ties are broken by the greater id. Records that cannot be decoded are
    /// skipped; the scan never fails because of a single bad record.
    pub fn latest_for_session(&self, owner: &OwnerKey) -> Result<Option<DraftView>> {
        let result = self.latest_inner(owner);
        observe("latest", &result);
        self.maybe_sweep();
        result
    }

    fn latest_inner(&self, owner: &OwnerKey) -> Result<Option<DraftView>> {
        let latest = self.owned_records(owner)?.into_iter().max_by(newer);
        Ok(latest.map(|record| record.view()))
    }

    /// All of the owner's readable drafts, newest first.
    pub fn list_for_session(&self, owner: &OwnerKey) -> Result<Vec<DraftView>> {
        let mut records = self.owned_records(owner)?;
        records.sort_by(|a, b| newer(b, a));
        Ok(records.iter().map(DraftRecord::view).collect())
    }

    fn owned_records(&self, owner: &OwnerKey) -> Result<Vec<DraftRecord>> {
        Ok(self
            .backend
            .scan_owner(owner)?
            .into_iter()
            .filter_map(|raw| match decode(&raw.bytes) {
                Ok(record) => Some(record),
                Err(e) => {
                    increment_counter!("draft_store_corrupt_records_total");
                    tracing::warn!(locator = %raw.locator, error = %e, "Skipping corrupt draft record");
                    None
                }
            })
            .filter(|record| &record.owner == owner)
            .collect())
    }

    /// Remove drafts created before the retention window and quarantine
    /// unreadable records.
    pub fn sweep(&self) -> Result<SweepReport> {
        let cutoff = Timestamp::from_datetime(self.clock.now() - self.retention.window);
        let mut report = SweepReport::default();

        for raw in self.backend.scan_all()? {
            report.scanned += 1;
            let record = match decode(&raw.bytes) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(locator = %raw.locator, error = %e, "Quarantining corrupt draft record");
                    self.backend.quarantine(&raw.locator)?;
                    report.quarantined += 1;
                    continue;
                }
            };
            if record.created_at >= cutoff {
                continue;
            }
            let removed = self.with_draft_lock(record.id, || {
                self.backend.remove(&record.owner, &record.id)
            })?;
            if removed {
                tracing::debug!(draft_id = %record.id, created_at = %record.created_at, "Draft expired");
                report.removed += 1;
            }
        }

        metrics::counter!("draft_store_swept_total", report.removed as u64);
        if report.removed > 0 || report.quarantined > 0 {
            tracing::info!(
                scanned = report.scanned,
                removed = report.removed,
                quarantined = report.quarantined,
                "Retention sweep finished"
            );
        }
        Ok(report)
    }

    /// Run [`DraftStore::sweep`] if the sweep interval has elapsed.
    ///
    /// Failures are logged and swallowed; retention is cleanup, never a
    /// reason to fail the request that triggered it.
    pub fn maybe_sweep(&self) -> Option<SweepReport> {
        let now = self.clock.now();
        {
            let mut last = self.last_sweep.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(previous) = *last {
                if now - previous < self.retention.sweep_interval {
                    return None;
                }
            }
            *last = Some(now);
        }

        match self.sweep() {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(error = %e, "Retention sweep failed");
                None
            }
        }
    }

    fn write(&self, record: &DraftRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)
            .map_err(|e| MetadraftError::Storage(format!("Serialization failed: {}", e)))?;
        histogram!("draft_store_payload_bytes", bytes.len() as f64);
        self.backend.put(&record.owner, &record.id, &bytes)
    }

    fn load_owned(&self, id: &DraftId, owner: &OwnerKey) -> Result<DraftRecord> {
        let bytes = self
            .backend
            .fetch(id)?
            .ok_or_else(|| MetadraftError::NotFound(id.to_string()))?;
        let record = decode(&bytes)?;
        if &record.owner != owner {
            tracing::warn!(draft_id = %id, caller = owner.short(), "Rejected access to foreign draft");
            return Err(MetadraftError::Ownership(id.to_string()).into());
        }
        Ok(record)
    }

    fn with_draft_lock<T>(&self, id: DraftId, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let slot = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            locks.entry(id).or_default().clone()
        };

        let result = {
            let _guard = slot.lock().unwrap_or_else(|p| p.into_inner());
            f()
        };

        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        // One reference in the map plus ours: nobody else is waiting.
        if Arc::strong_count(&slot) == 2 {
            locks.remove(&id);
        }
        result
    }

    #[cfg(test)]
    fn lock_slots(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

/// Orders by embedded `updatedAt`, then by id.
fn newer(a: &DraftRecord, b: &DraftRecord) -> std::cmp::Ordering {
    a.updated_at
        .cmp(&b.updated_at)
        .then_with(|| a.id.cmp(&b.id))
}

fn parse_id(raw: &str) -> Result<DraftId> {
    DraftId::parse(raw).ok_or_else(|| MetadraftError::NotFound(raw.to_string()).into())
}

fn decode(bytes: &[u8]) -> Result<DraftRecord> {
    serde_json::from_slice(bytes).map_err(|e| MetadraftError::CorruptRecord(e.to_string()).into())
}

fn observe<T>(op: &'static str, result: &Result<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => match kind_of(e) {
            Some(MetadraftError::NotFound(_)) => "not_found",
            Some(MetadraftError::Ownership(_)) => "forbidden",
            _ => "error",
        },
    };
    increment_counter!("draft_store_operations_total", "op" => op, "outcome" => outcome);
}
