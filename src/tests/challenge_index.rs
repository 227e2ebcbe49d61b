use tempfile::TempDir;

use crate::challenge_index::ChallengeIndex;

#[test]
fn direct_hit_after_registration() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("alpha");
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(root.join("src/main.c"), "").unwrap();

    let index = ChallengeIndex::new();
    index.register("alpha", &root);

    let owner = index.lookup(&root.join("src/main.c")).unwrap();
    assert_eq!(owner.challenge_name, "alpha");
    assert_eq!(owner.challenge_root, root);
}

#[test]
fn longest_prefix_wins_for_nested_challenges() {
    let dir = TempDir::new().unwrap();
    let outer = dir.path().join("outer");
    let inner = outer.join("nested/inner");
    std::fs::create_dir_all(&inner).unwrap();

    let index = ChallengeIndex::new();
    index.register("outer", &outer);
    index.register("inner", &inner);

    let owner = index
        .lookup(&inner.join("not-yet-walked.txt"))
        .unwrap();
    assert_eq!(owner.challenge_name, "inner");
}

#[test]
fn unregistered_path_returns_none() {
    let dir = TempDir::new().unwrap();
    let index = ChallengeIndex::new();
    assert!(index.lookup(&dir.path().join("nowhere")).is_none());
}

#[test]
fn unregister_drops_all_entries() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("alpha");
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(root.join("src/main.c"), "").unwrap();

    let index = ChallengeIndex::new();
    index.register("alpha", &root);
    assert!(index.lookup(&root.join("src/main.c")).is_some());

    index.unregister("alpha");
    assert!(index.lookup(&root.join("src/main.c")).is_none());
    assert!(index.registered().is_empty());
}

#[test]
fn dot_prefixed_directories_are_not_returned_as_watch_targets() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("alpha");
    std::fs::create_dir_all(root.join(".git")).unwrap();
    std::fs::create_dir_all(root.join("src")).unwrap();

    let index = ChallengeIndex::new();
    let watched = index.register("alpha", &root);

    assert!(watched.contains(&root.join("src")));
    assert!(!watched.iter().any(|p| p.ends_with(".git")));
}

#[test]
fn opportunistic_insert_resolves_future_lookups_directly() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("alpha");
    std::fs::create_dir_all(&root).unwrap();

    let index = ChallengeIndex::new();
    index.register("alpha", &root);

    let nested = root.join("new/deeply/nested/file.txt");
    assert!(index.lookup(&nested).is_some());
    // Second lookup should hit the now-populated direct entry.
    assert!(index.lookup(&nested).is_some());
}
