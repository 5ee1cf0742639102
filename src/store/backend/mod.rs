//! Physical storage for draft records
//!
//! This module defines the [`RecordStore`] trait that every backend must
//! satisfy. Concrete implementations live in submodules:
//!
//! - [`fs::FsRecordStore`] -- one JSON file per draft, grouped in a
//!   directory per owner, written via temp file + rename.
//! - [`kv::SledRecordStore`] -- embedded `sled` database with a
//!   per-owner index tree.
//!
//! Backends move opaque bytes. Decoding, ownership checks, ordering, and
//! retention all live in [`crate::store::DraftStore`], so no backend can use
//! its own metadata (file mtimes, insertion order) as an ordering signal.

use crate::error::Result;
use crate::store::record::{DraftId, OwnerKey};

pub mod fs;
pub mod kv;

pub use self::fs::FsRecordStore;
pub use self::kv::SledRecordStore;

/// Undecoded record as read from a backend.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// Backend-specific locator, used to quarantine the record if it
    /// turns out to be unreadable.
    pub locator: String,
    /// Encoded record bytes
    pub bytes: Vec<u8>,
}

/// Keyed record storage with atomic per-record writes and owner-scoped
/// enumeration.
///
/// Every write must be an atomic swap: a concurrent reader sees either the
/// previous bytes or the new bytes, never a mix.
pub trait RecordStore: Send + Sync + std::fmt::Debug {
    /// Write (insert or replace) the record for `id` under `owner`.
    fn put(&self, owner: &OwnerKey, id: &DraftId, bytes: &[u8]) -> Result<()>;

    /// Read the record for `id`, whoever owns it.
    fn fetch(&self, id: &DraftId) -> Result<Option<Vec<u8>>>;

    /// Remove the record for `id` under `owner`. Returns whether it existed.
    fn remove(&self, owner: &OwnerKey, id: &DraftId) -> Result<bool>;

    /// All records filed under `owner`.
    ///
    /// Must not fail because a single record is unreadable; such records are
    /// still returned so the caller can decide to skip them.
    fn scan_owner(&self, owner: &OwnerKey) -> Result<Vec<RawRecord>>;

    /// Every record in the store.
    fn scan_all(&self) -> Result<Vec<RawRecord>>;

    /// Move an unreadable record out of the live keyspace.
    fn quarantine(&self, locator: &str) -> Result<()>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}
