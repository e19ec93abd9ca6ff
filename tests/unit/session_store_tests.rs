//! Unit tests for session persistence through the `SessionStore` trait.

use std::fs;

use nanoclaw_harness::models::session::SessionRecord;
use nanoclaw_harness::persistence::{FileSessionStore, MemorySessionStore, SessionStore};

fn stores() -> Vec<(tempfile::TempDir, Box<dyn SessionStore>)> {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = Box::new(FileSessionStore::new(dir.path().join("sessions")));
    let mem_dir = tempfile::tempdir().expect("tempdir");
    vec![
        (dir, file as Box<dyn SessionStore>),
        (mem_dir, Box::new(MemorySessionStore::new())),
    ]
}

#[test]
fn both_implementations_honour_the_load_save_reset_contract() {
    for (_guard, store) in stores() {
        assert!(store.load("family").expect("load").is_none());

        store.save("family", "sess-1").expect("save");
        assert_eq!(
            store.load("family").expect("load").expect("record").session_id,
            "sess-1"
        );

        store.save("family", "sess-2").expect("overwrite");
        assert_eq!(
            store.load("family").expect("load").expect("record").session_id,
            "sess-2",
            "last writer wins"
        );

        assert!(store.reset("family").expect("reset"));
        assert!(store.load("family").expect("load").is_none());
        assert!(!store.reset("family").expect("second reset"), "already gone");
    }
}

#[test]
fn groups_are_isolated_from_each_other() {
    for (_guard, store) in stores() {
        store.save("alpha", "sess-a").expect("save");
        store.save("beta", "sess-b").expect("save");

        store.reset("alpha").expect("reset alpha");
        assert!(store.load("alpha").expect("load").is_none());
        assert_eq!(
            store.load("beta").expect("load").expect("record").session_id,
            "sess-b",
            "resetting one group never touches another"
        );
    }
}

#[test]
fn file_store_leaves_no_staging_files_behind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sessions = dir.path().join("sessions");
    let store = FileSessionStore::new(&sessions);
    store.save("family", "sess-1").expect("save");
    store.save("family", "sess-2").expect("save");

    let entries: Vec<String> = fs::read_dir(&sessions)
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries, ["family.json"], "atomic rename cleans up staging");
}

#[test]
fn stored_record_is_plain_json_with_a_timestamp() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileSessionStore::new(dir.path());
    let saved = store.save("family", "sess-1").expect("save");

    let raw = fs::read_to_string(dir.path().join("family.json")).expect("read record");
    let parsed: SessionRecord = serde_json::from_str(&raw).expect("record is JSON");
    assert_eq!(parsed.session_id, "sess-1");
    assert_eq!(parsed.updated_at, saved.updated_at);
}

#[test]
fn save_refreshes_the_timestamp() {
    let store = MemorySessionStore::new();
    let first = store.save("family", "sess-1").expect("save");
    let second = store.save("family", "sess-2").expect("save");
    assert!(second.updated_at >= first.updated_at);
}
