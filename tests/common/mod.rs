use chrono::{TimeZone, Utc};
use metadraft::clock::{Clock, ManualClock, SystemClock};
use metadraft::payload::Document;
use metadraft::store::{DraftStore, FsRecordStore, RecordStore, RetentionPolicy, SledRecordStore};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Which backend a test store runs on.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum Backend {
    Fs,
    Sled,
}

#[allow(dead_code)]
pub const BACKENDS: [Backend; 2] = [Backend::Fs, Backend::Sled];

#[allow(dead_code)]
pub fn open_backend(kind: Backend, dir: &TempDir) -> Arc<dyn RecordStore> {
    match kind {
        Backend::Fs => Arc::new(FsRecordStore::open(dir.path()).expect("failed to open fs store")),
        Backend::Sled => Arc::new(
            SledRecordStore::open(dir.path().join("drafts.sled")).expect("failed to open sled store"),
        ),
    }
}

#[allow(dead_code)]
pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    ))
}

/// Store over `kind` driven by `clock`.
#[allow(dead_code)]
pub fn store_with_clock(kind: Backend, clock: Arc<dyn Clock>) -> (DraftStore, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let backend = open_backend(kind, &tmp);
    (DraftStore::new(backend, clock, RetentionPolicy::default()), tmp)
}

/// Store over `kind` on the system clock.
#[allow(dead_code)]
pub fn store(kind: Backend) -> (DraftStore, TempDir) {
    store_with_clock(kind, Arc::new(SystemClock))
}

#[allow(dead_code)]
pub fn doc(value: serde_json::Value) -> Document {
    Document::from_value(value).expect("test payload must be an object")
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
