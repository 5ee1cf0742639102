//! Draft store integration tests
//!
//! Every behavioral property is checked against both record backends.

mod common;

use common::{doc, manual_clock, open_backend, store, store_with_clock, Backend, BACKENDS};
use metadraft::clock::SystemClock;
use metadraft::error::{kind_of, MetadraftError};
use metadraft::store::{DraftId, DraftStore, FsRecordStore, OwnerKey, RetentionPolicy};
use serde_json::json;
use std::collections::BTreeSet;
use std::fs::File;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(kind_of(err), Some(MetadraftError::NotFound(_)))
}

fn is_ownership(err: &anyhow::Error) -> bool {
    matches!(kind_of(err), Some(MetadraftError::Ownership(_)))
}

#[test]
fn test_create_get_update_scenario() {
    for backend in BACKENDS {
        let (store, _tmp) = store(backend);
        let session = OwnerKey::from_credential("session-s");
        let original = doc(json!({
            "values": {"title": "Test dataset"},
            "timestamp": "2024-01-01T00:00:00Z"
        }));

        let created = store.create(&session, original.clone()).unwrap();
        let id = created.id.to_string();
        assert_eq!(store.get(&id, &session).unwrap().payload, original);

        store
            .update(&id, &session, doc(json!({"timestamp": "2024-01-02T00:00:00Z"})))
            .unwrap();

        let payload = store.get(&id, &session).unwrap().payload;
        assert!(!payload.contains_key("values"), "{:?}: update must replace", backend);
        assert_eq!(payload.get("timestamp"), Some(&json!("2024-01-02T00:00:00Z")));
    }
}

#[test]
fn test_round_trip_preserves_document_verbatim() {
    let payload = doc(json!({
        "zeta": 1,
        "alpha": {"nested": [1, 2, {"deep": null}]},
        "authors": [{"name": "Ada"}, {"name": "Grace"}],
        "unicode": "café ☕",
        "float": 1.5
    }));
    for backend in BACKENDS {
        let (store, _tmp) = store(backend);
        let session = OwnerKey::from_credential("s");
        let id = store.create(&session, payload.clone()).unwrap().id;
        let view = store.get(&id.to_string(), &session).unwrap();
        assert_eq!(view.payload, payload);
        assert_eq!(
            view.payload.keys().collect::<Vec<_>>(),
            vec!["zeta", "alpha", "authors", "unicode", "float"]
        );
        assert_eq!(view.checksum, payload.checksum());
    }
}

#[test]
fn test_latest_follows_wall_clock_order() {
    for backend in BACKENDS {
        let (store, _tmp) = store(backend);
        let session = OwnerKey::from_credential("s");
        store.create(&session, doc(json!({"title": "First"}))).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        store.create(&session, doc(json!({"title": "Second"}))).unwrap();

        let latest = store.latest_for_session(&session).unwrap().unwrap();
        assert_eq!(latest.payload.get("title"), Some(&json!("Second")));
    }
}

#[test]
fn test_latest_ignores_file_modification_times() {
    let tmp = TempDir::new().unwrap();
    let backend = Arc::new(FsRecordStore::open(tmp.path()).unwrap());
    let store = DraftStore::new(backend.clone(), Arc::new(SystemClock), RetentionPolicy::default());
    let session = OwnerKey::from_credential("s");

    let first = store.create(&session, doc(json!({"title": "First"}))).unwrap();
    std::thread::sleep(Duration::from_millis(5));
    let second = store.create(&session, doc(json!({"title": "Second"}))).unwrap();

    // Make the older record look newer on disk, and the newer one ancient.
    let now = SystemTime::now();
    File::options()
        .write(true)
        .open(backend.record_path(&session, &first.id))
        .unwrap()
        .set_modified(now + Duration::from_secs(3600))
        .unwrap();
    File::options()
        .write(true)
        .open(backend.record_path(&session, &second.id))
        .unwrap()
        .set_modified(now - Duration::from_secs(86_400))
        .unwrap();

    let latest = store.latest_for_session(&session).unwrap().unwrap();
    assert_eq!(latest.id, second.id);
    assert_eq!(latest.payload.get("title"), Some(&json!("Second")));
}

#[test]
fn test_latest_is_none_without_drafts() {
    for backend in BACKENDS {
        let (store, _tmp) = store(backend);
        let owner = OwnerKey::from_credential("someone");
        store.create(&owner, doc(json!({"a": 1}))).unwrap();
        assert!(store
            .latest_for_session(&OwnerKey::from_credential("nobody"))
            .unwrap()
            .is_none());
    }
}

#[test]
fn test_sessions_are_isolated() {
    for backend in BACKENDS {
        let (store, _tmp) = store(backend);
        let owner = OwnerKey::from_credential("owner");
        let other = OwnerKey::from_credential("other");
        let id = store
            .create(&owner, doc(json!({"secret": true})))
            .unwrap()
            .id
            .to_string();

        assert!(is_ownership(&store.get(&id, &other).unwrap_err()));
        assert!(is_ownership(
            &store.update(&id, &other, doc(json!({}))).unwrap_err()
        ));
        assert!(is_ownership(&store.delete(&id, &other).unwrap_err()));
        assert!(store.latest_for_session(&other).unwrap().is_none());

        // The failed attempts changed nothing.
        assert_eq!(
            store.get(&id, &owner).unwrap().payload,
            doc(json!({"secret": true}))
        );
    }
}

#[test]
fn test_unknown_ids_are_not_found() {
    for backend in BACKENDS {
        let (store, _tmp) = store(backend);
        let owner = OwnerKey::from_credential("s");
        for id in [
            DraftId::generate().to_string(),
            "not-a-ulid".to_string(),
            "../../etc/passwd".to_string(),
        ] {
            assert!(is_not_found(&store.get(&id, &owner).unwrap_err()));
            assert!(is_not_found(
                &store.update(&id, &owner, doc(json!({}))).unwrap_err()
            ));
            assert!(is_not_found(&store.delete(&id, &owner).unwrap_err()));
        }
    }
}

#[test]
fn test_updated_at_strictly_increases_with_frozen_clock() {
    for backend in BACKENDS {
        let clock = manual_clock();
        let (store, _tmp) = store_with_clock(backend, clock.clone());
        let owner = OwnerKey::from_credential("s");
        let created = store.create(&owner, doc(json!({}))).unwrap();
        let id = created.id.to_string();

        let mut previous = created.updated_at;
        for n in 0..20 {
            let updated = store.update(&id, &owner, doc(json!({"n": n}))).unwrap();
            assert!(updated.updated_at > previous);
            previous = updated.updated_at;
        }
        assert_eq!(store.get(&id, &owner).unwrap().updated_at, previous);
    }
}

#[test]
fn test_updated_at_survives_clock_step_back() {
    let clock = manual_clock();
    let (store, _tmp) = store_with_clock(Backend::Fs, clock.clone());
    let owner = OwnerKey::from_credential("s");
    let created = store.create(&owner, doc(json!({}))).unwrap();

    clock.advance(chrono::Duration::hours(-1));
    let updated = store
        .update(&created.id.to_string(), &owner, doc(json!({})))
        .unwrap();
    assert!(updated.updated_at > created.updated_at);
}

#[test]
fn test_corrupt_records_are_skipped_then_quarantined() {
    for backend in BACKENDS {
        let tmp = TempDir::new().unwrap();
        let records = open_backend(backend, &tmp);
        let clock = manual_clock();
        let store = DraftStore::new(records.clone(), clock.clone(), RetentionPolicy::default());
        let owner = OwnerKey::from_credential("s");

        let good = store.create(&owner, doc(json!({"ok": true}))).unwrap();
        records
            .put(&owner, &DraftId::generate(), b"{\"id\": truncated")
            .unwrap();

        let latest = store.latest_for_session(&owner).unwrap().unwrap();
        assert_eq!(latest.id, good.id, "{:?}", backend);

        let report = store.sweep().unwrap();
        assert_eq!(report.quarantined, 1);
        assert_eq!(report.removed, 0);
        assert_eq!(records.scan_owner(&owner).unwrap().len(), 1);
        assert!(store.get(&good.id.to_string(), &owner).is_ok());
    }
}

#[test]
fn test_retention_sweep_purges_by_created_at() {
    for backend in BACKENDS {
        let clock = manual_clock();
        let (store, _tmp) = store_with_clock(backend, clock.clone());
        let owner = OwnerKey::from_credential("s");

        let old = store.create(&owner, doc(json!({"n": 1}))).unwrap();
        clock.advance(chrono::Duration::days(20));
        // Updating does not extend the retention of a draft.
        store
            .update(&old.id.to_string(), &owner, doc(json!({"n": 2})))
            .unwrap();
        let young = store.create(&owner, doc(json!({"n": 3}))).unwrap();
        clock.advance(chrono::Duration::days(11));

        let report = store.sweep().unwrap();
        assert_eq!(report.removed, 1, "{:?}", backend);
        assert!(is_not_found(
            &store.get(&old.id.to_string(), &owner).unwrap_err()
        ));
        assert_eq!(
            store.latest_for_session(&owner).unwrap().unwrap().id,
            young.id
        );
    }
}

#[test]
fn test_opportunistic_sweep_runs_on_access() {
    let clock = manual_clock();
    let (store, _tmp) = store_with_clock(Backend::Fs, clock.clone());
    let owner = OwnerKey::from_credential("s");
    let old = store.create(&owner, doc(json!({}))).unwrap();

    clock.advance(chrono::Duration::days(31));
    let fresh = store.create(&owner, doc(json!({}))).unwrap();
    assert_eq!(
        store.latest_for_session(&owner).unwrap().unwrap().id,
        fresh.id
    );
    assert!(is_not_found(
        &store.get(&old.id.to_string(), &owner).unwrap_err()
    ));
}

#[test]
fn test_concurrent_updates_to_one_draft_serialize() {
    for backend in BACKENDS {
        let clock = manual_clock();
        let (store, _tmp) = store_with_clock(backend, clock);
        let store = Arc::new(store);
        let owner = OwnerKey::from_credential("s");
        let id = store.create(&owner, doc(json!({}))).unwrap().id.to_string();

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = store.clone();
                let owner = owner.clone();
                let id = id.clone();
                std::thread::spawn(move || {
                    (0..20)
                        .map(|n| {
                            store
                                .update(&id, &owner, doc(json!({"worker": worker, "n": n})))
                                .unwrap()
                                .updated_at
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let stamps: BTreeSet<_> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        // Frozen clock: only serialized updates can yield 160 distinct stamps.
        assert_eq!(stamps.len(), 160, "{:?}", backend);
        let stored = store.get(&id, &owner).unwrap();
        assert_eq!(Some(&stored.updated_at), stamps.iter().next_back());
    }
}

#[test]
fn test_latest_tolerates_concurrent_writes() {
    for backend in BACKENDS {
        let (store, _tmp) = store(backend);
        let store = Arc::new(store);
        let owner = OwnerKey::from_credential("s");
        store.create(&owner, doc(json!({"seed": true}))).unwrap();

        let writer = {
            let store = store.clone();
            let owner = owner.clone();
            std::thread::spawn(move || {
                for n in 0..50 {
                    store.create(&owner, doc(json!({"n": n}))).unwrap();
                }
            })
        };
        for _ in 0..50 {
            assert!(store.latest_for_session(&owner).unwrap().is_some());
        }
        writer.join().unwrap();

        assert_eq!(store.list_for_session(&owner).unwrap().len(), 51);
    }
}

#[test]
fn test_delete_removes_from_latest() {
    for backend in BACKENDS {
        let (store, _tmp) = store(backend);
        let owner = OwnerKey::from_credential("s");
        let only = store.create(&owner, doc(json!({}))).unwrap();
        store.delete(&only.id.to_string(), &owner).unwrap();
        assert!(store.latest_for_session(&owner).unwrap().is_none());
        assert!(is_not_found(
            &store.get(&only.id.to_string(), &owner).unwrap_err()
        ));
    }
}
