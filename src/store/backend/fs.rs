//! Directory-tree record storage
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/<owner-digest>/<draft-id>.json    live records
//! <root>/quarantine/<owner>__<id>.json.corrupt
//! ```
//!
//! Writes go to a hidden temp file in the owner directory, are fsynced, and
//! then renamed over the live file, so readers never observe a partial record.
//! File modification times are never consulted.

use crate::error::{MetadraftError, Result};
use crate::store::backend::{RawRecord, RecordStore};
use crate::store::record::{DraftId, OwnerKey};
use anyhow::Context;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use ulid::Ulid;
use walkdir::WalkDir;

const QUARANTINE_DIR: &str = "quarantine";
const RECORD_EXT: &str = "json";

/// Filesystem-backed [`RecordStore`].
#[derive(Debug, Clone)]
pub struct FsRecordStore {
    root: PathBuf,
}

impl FsRecordStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns `MetadraftError::Storage` if the root directory cannot be created.
    ///
    /// # Examples
    ///
    /// ```
    /// use metadraft::store::backend::FsRecordStore;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let store = FsRecordStore::open(dir.path()).unwrap();
    /// assert_eq!(store.root(), dir.path());
    /// ```
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create storage root {}", root.display()))
            .map_err(|e| MetadraftError::Storage(format!("{:#}", e)))?;
        Ok(Self { root })
    }

    /// Storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the live record for `id` under `owner`.
    pub fn record_path(&self, owner: &OwnerKey, id: &DraftId) -> PathBuf {
        self.root
            .join(owner.as_str())
            .join(format!("{}.{}", id, RECORD_EXT))
    }

    fn owner_dir(&self, owner: &OwnerKey) -> Result<PathBuf> {
        if !owner.is_well_formed() {
            return Err(MetadraftError::Storage(format!("malformed owner key {}", owner.short())).into());
        }
        Ok(self.root.join(owner.as_str()))
    }

    fn read_record(path: &Path) -> Option<RawRecord> {
        match fs::read(path) {
            Ok(bytes) => Some(RawRecord {
                locator: path.to_string_lossy().into_owned(),
                bytes,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable draft file");
                None
            }
        }
    }
}

fn is_live_record(path: &Path) -> bool {
    let named_ok = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| !n.starts_with('.'))
        .unwrap_or(false);
    named_ok && path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXT)
}

fn storage_err(action: &str, path: &Path, err: std::io::Error) -> anyhow::Error {
    MetadraftError::Storage(format!("{} {}: {}", action, path.display(), err)).into()
}

impl RecordStore for FsRecordStore {
    fn put(&self, owner: &OwnerKey, id: &DraftId, bytes: &[u8]) -> Result<()> {
        let dir = self.owner_dir(owner)?;
        fs::create_dir_all(&dir).map_err(|e| storage_err("Failed to create", &dir, e))?;

        let target = self.record_path(owner, id);
        let tmp = dir.join(format!(".{}.{}.tmp", id, Ulid::new()));

        let write = || -> std::io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            drop(file);
            fs::rename(&tmp, &target)
        };

        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(storage_err("Failed to write", &target, e));
        }
        Ok(())
    }

    fn fetch(&self, id: &DraftId) -> Result<Option<Vec<u8>>> {
        let pattern = format!(
            "{}/*/{}.{}",
            glob::Pattern::escape(&self.root.to_string_lossy()),
            id,
            RECORD_EXT
        );
        let paths = glob::glob(&pattern)
            .map_err(|e| MetadraftError::Storage(format!("Invalid lookup pattern: {}", e)))?;

        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable path during lookup");
                    continue;
                }
            };
            match fs::read(&path) {
                Ok(bytes) => return Ok(Some(bytes)),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(storage_err("Failed to read", &path, e)),
            }
        }
        Ok(None)
    }

    fn remove(&self, owner: &OwnerKey, id: &DraftId) -> Result<bool> {
        self.owner_dir(owner)?;
        let path = self.record_path(owner, id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage_err("Failed to remove", &path, e)),
        }
    }

    fn scan_owner(&self, owner: &OwnerKey) -> Result<Vec<RawRecord>> {
        let dir = self.owner_dir(owner)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_err("Failed to list", &dir, e)),
        };

        Ok(entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| is_live_record(path))
            .filter_map(|path| Self::read_record(&path))
            .collect())
    }

    fn scan_all(&self) -> Result<Vec<RawRecord>> {
        let quarantine = self.root.join(QUARANTINE_DIR);
        Ok(WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_entry(|e| !e.path().starts_with(&quarantine))
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && is_live_record(entry.path()))
            .filter_map(|entry| Self::read_record(entry.path()))
            .collect())
    }

    fn quarantine(&self, locator: &str) -> Result<()> {
        let path = PathBuf::from(locator);
        if !path.starts_with(&self.root) {
            return Err(MetadraftError::Storage(format!("{} is outside the storage root", locator)).into());
        }
        let owner = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");
        let file = path.file_name().and_then(|n| n.to_str()).unwrap_or("record");

        let dir = self.root.join(QUARANTINE_DIR);
        fs::create_dir_all(&dir).map_err(|e| storage_err("Failed to create", &dir, e))?;
        let target = dir.join(format!("{}__{}.corrupt", owner, file));
        match fs::rename(&path, &target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_err("Failed to quarantine", &path, e)),
        }
    }

    fn name(&self) -> &'static str {
        "fs"
    }
}
