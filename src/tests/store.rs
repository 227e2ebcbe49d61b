use tempfile::TempDir;

use crate::store::PersistentStore;

fn open_store() -> (TempDir, PersistentStore) {
    let dir = TempDir::new().unwrap();
    let store = PersistentStore::open(&dir.path().join("watcher.db")).unwrap();
    (dir, store)
}

#[test]
fn recent_logs_returns_newest_first() {
    let (_dir, store) = open_store();
    store.append_log("INFO", "test", None, None, "first", None, None);
    store.append_log("ERROR", "test", Some("chal"), Some("script"), "second", Some("boom"), Some(12));

    let logs = store.recent_logs(10).unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].message, "second");
    assert_eq!(logs[0].error.as_deref(), Some("boom"));
    assert_eq!(logs[1].message, "first");
}

#[test]
fn upsert_challenge_state_overwrites_existing_row() {
    let (_dir, store) = open_store();
    store.upsert_challenge_state("chal-a", "watching", None, "{}");
    store.upsert_challenge_state("chal-a", "error", Some("boom"), "{}");

    let executions = store.recent_script_executions(10, None).unwrap();
    assert!(executions.is_empty());
}

#[test]
fn recent_script_executions_filters_by_challenge_name() {
    let (_dir, store) = open_store();
    store.append_script_execution("chal-a", "build", "interval", "make build", "completed", Some(1_000), Some("ok"), None, Some(0));
    store.append_script_execution("chal-b", "build", "interval", "make build", "completed", Some(2_000), Some("ok"), None, Some(0));

    let all = store.recent_script_executions(10, None).unwrap();
    assert_eq!(all.len(), 2);

    let filtered = store.recent_script_executions(10, Some("chal-a")).unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].challenge_name, "chal-a");
}

#[test]
fn folder_mapping_distinguishes_absence_from_match() {
    let (_dir, store) = open_store();
    assert!(store.folder_mapping("web", "/events/web/chal-a").unwrap().is_none());

    store.upsert_folder_mapping("web", "/events/web/chal-a", "123", "Some Challenge");
    let found = store.folder_mapping("web", "/events/web/chal-a").unwrap().unwrap();
    assert_eq!(found.challenge_id, "123");
    assert_eq!(found.challenge_title, "Some Challenge");

    store.upsert_folder_mapping("web", "/events/web/chal-a", "123", "Renamed Challenge");
    let updated = store.folder_mapping("web", "/events/web/chal-a").unwrap().unwrap();
    assert_eq!(updated.challenge_title, "Renamed Challenge");
}
