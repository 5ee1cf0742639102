//! Durable memory of the current draft id
//!
//! After the first successful save the autosave component remembers which
//! draft it is shadowing, so later saves update that draft instead of
//! creating new ones, including across restarts.

use crate::error::{MetadraftError, Result};
use crate::store::DraftId;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Storage for the remembered draft id.
pub trait DraftIdStore: Send + Sync + std::fmt::Debug {
    /// The remembered id, if any.
    fn load(&self) -> Result<Option<DraftId>>;

    /// Remember `id`, replacing any previous value.
    fn save(&self, id: &DraftId) -> Result<()>;

    /// Forget the remembered id.
    fn clear(&self) -> Result<()>;
}

/// In-process id store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryIdStore {
    id: Mutex<Option<DraftId>>,
}

impl MemoryIdStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `id`.
    pub fn with_id(id: DraftId) -> Self {
        Self {
            id: Mutex::new(Some(id)),
        }
    }

    /// Current value without going through `Result`.
    pub fn current(&self) -> Option<DraftId> {
        *self.id.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl DraftIdStore for MemoryIdStore {
    fn load(&self) -> Result<Option<DraftId>> {
        Ok(self.current())
    }

    fn save(&self, id: &DraftId) -> Result<()> {
        *self.id.lock().unwrap_or_else(|p| p.into_inner()) = Some(*id);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.id.lock().unwrap_or_else(|p| p.into_inner()) = None;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IdFile {
    draft_id: DraftId,
}

/// Id store backed by a small JSON file, written atomically.
#[derive(Debug, Clone)]
pub struct FileIdStore {
    path: PathBuf,
}

impl FileIdStore {
    /// Store at `path`. The file and its parent directory are created on the
    /// first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the id file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl DraftIdStore for FileIdStore {
    fn load(&self) -> Result<Option<DraftId>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MetadraftError::Io(e).into()),
        };
        match serde_json::from_slice::<IdFile>(&bytes) {
            Ok(file) => Ok(Some(file.draft_id)),
            Err(e) => {
                // An unreadable id file only costs us a fresh draft.
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring unreadable draft id file");
                Ok(None)
            }
        }
    }

    fn save(&self, id: &DraftId) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec(&IdFile { draft_id: *id })?;
        let tmp = self.tmp_path();
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), draft_id = %id, "Remembered draft id");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MetadraftError::Io(e).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryIdStore::new();
        assert!(store.load().unwrap().is_none());
        let id = DraftId::generate();
        store.save(&id).unwrap();
        assert_eq!(store.load().unwrap(), Some(id));
        store.clear().unwrap();
        assert!(store.current().is_none());
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("id.json");
        let id = DraftId::generate();
        FileIdStore::new(&path).save(&id).unwrap();

        let reopened = FileIdStore::new(&path);
        assert_eq!(reopened.load().unwrap(), Some(id));
        assert!(!reopened.tmp_path().exists());
    }

    #[test]
    fn test_file_store_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = FileIdStore::new(dir.path().join("id.json"));
        store.clear().unwrap();
        store.save(&DraftId::generate()).unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_ignores_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("id.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(FileIdStore::new(&path).load().unwrap().is_none());
    }
}
