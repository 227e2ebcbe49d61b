use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::git_puller::GitPuller;

fn git(dir: &std::path::Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "test")
        .env("GIT_AUTHOR_EMAIL", "test@test")
        .env("GIT_COMMITTER_NAME", "test")
        .env("GIT_COMMITTER_EMAIL", "test@test")
        .status()
        .expect("git available for test setup");
    assert!(status.success(), "git {args:?} failed");
}

fn init_repo_with_remote() -> (TempDir, TempDir) {
    let remote = TempDir::new().unwrap();
    git(remote.path(), &["init", "--bare", "-q", "-b", "main"]);

    let seed = TempDir::new().unwrap();
    git(seed.path(), &["init", "-q", "-b", "main"]);
    std::fs::write(seed.path().join("a.txt"), "one").unwrap();
    git(seed.path(), &["add", "."]);
    git(seed.path(), &["commit", "-q", "-m", "initial"]);
    git(
        seed.path(),
        &["remote", "add", "origin", remote.path().to_str().unwrap()],
    );
    git(seed.path(), &["push", "-q", "origin", "HEAD:main"]);
    git(remote.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);

    let clone_dir = TempDir::new().unwrap();
    git(
        clone_dir.path().parent().unwrap(),
        &[
            "clone",
            "-q",
            remote.path().to_str().unwrap(),
            clone_dir.path().to_str().unwrap(),
        ],
    );

    (remote, clone_dir)
}

#[tokio::test]
async fn callback_not_run_when_head_unchanged() {
    let (_remote, clone_dir) = init_repo_with_remote();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();

    let puller = GitPuller::new(
        clone_dir.path().to_path_buf(),
        Duration::from_secs(3600),
        Box::new(move || {
            let calls_clone = calls_clone.clone();
            Box::pin(async move {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })
        }),
    );

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_clone.cancel();
    });
    puller.run(cancel).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn callback_runs_once_after_upstream_advances() {
    let (remote, clone_dir) = init_repo_with_remote();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();

    // Push a second commit to the remote before the puller's initial pull runs.
    let second_seed = TempDir::new().unwrap();
    git(
        second_seed.path().parent().unwrap(),
        &[
            "clone",
            "-q",
            remote.path().to_str().unwrap(),
            second_seed.path().to_str().unwrap(),
        ],
    );
    std::fs::write(second_seed.path().join("b.txt"), "two").unwrap();
    git(second_seed.path(), &["add", "."]);
    git(second_seed.path(), &["commit", "-q", "-m", "second"]);
    git(second_seed.path(), &["push", "-q", "origin", "HEAD:main"]);

    let puller = GitPuller::new(
        clone_dir.path().to_path_buf(),
        Duration::from_secs(3600),
        Box::new(move || {
            let calls_clone = calls_clone.clone();
            Box::pin(async move {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })
        }),
    );

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel_clone.cancel();
    });
    puller.run(cancel).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_git_dir_is_skipped_without_panicking() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();

    let puller = GitPuller::new(
        dir.path().to_path_buf(),
        Duration::from_secs(3600),
        Box::new(move || {
            let calls_clone = calls_clone.clone();
            Box::pin(async move {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })
        }),
    );

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel_clone.cancel();
    });
    puller.run(cancel).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
