use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::scheduler::ScriptScheduler;
use crate::store::PersistentStore;

fn scheduler() -> (TempDir, Arc<PersistentStore>, ScriptScheduler) {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(PersistentStore::open(&dir.path().join("watcher.db")).unwrap());
    let scheduler = ScriptScheduler::new(CancellationToken::new(), store.clone(), Duration::from_secs(5));
    (dir, store, scheduler)
}

#[tokio::test]
async fn one_shot_script_runs_once_and_records_completion() {
    let (dir, store, scheduler) = scheduler();
    scheduler
        .run_with_interval_support("chal-a", "build", "exit 0", dir.path(), None)
        .await
        .unwrap();

    let executions = store.recent_script_executions(10, Some("chal-a")).unwrap();
    let statuses: Vec<&str> = executions.iter().map(|e| e.status.as_str()).collect();
    assert!(statuses.contains(&"completed"));
    assert!(!scheduler.get_active_intervals().contains_key("chal-a"));
}

#[tokio::test]
async fn one_shot_script_failure_is_recorded() {
    let (dir, store, scheduler) = scheduler();
    let result = scheduler
        .run_with_interval_support("chal-a", "build", "exit 7", dir.path(), None)
        .await;
    assert!(result.is_err());

    let executions = store.recent_script_executions(10, Some("chal-a")).unwrap();
    assert!(executions.iter().any(|e| e.status == "failed"));
}

#[tokio::test]
async fn interval_script_ticks_below_the_floor_and_can_be_stopped() {
    let (dir, _store, scheduler) = scheduler();
    scheduler.run_with_interval_support(
        "chal-a",
        "poll",
        "exit 0",
        dir.path(),
        Some(Duration::from_millis(1)),
    )
    .await
    .unwrap();

    assert!(scheduler.get_active_intervals().get("chal-a").map(|v| v.contains(&"poll".to_string())).unwrap_or(false));

    tokio::time::sleep(Duration::from_millis(1200)).await;
    scheduler.stop_interval_script("chal-a", "poll");
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(!scheduler.get_active_intervals().get("chal-a").map(|v| v.contains(&"poll".to_string())).unwrap_or(false));

    let metrics = scheduler.get_metrics();
    let script_metrics = &metrics["chal-a"]["poll"];
    assert!(script_metrics.execution_count >= 1);
    assert!(script_metrics.is_interval);
}

#[tokio::test]
async fn starting_an_interval_twice_replaces_the_previous_handle() {
    let (dir, _store, scheduler) = scheduler();
    scheduler.start_interval("chal-a", "poll", "exit 0", dir.path(), Duration::from_secs(60));
    scheduler.start_interval("chal-a", "poll", "exit 0", dir.path(), Duration::from_secs(60));

    assert_eq!(scheduler.get_active_intervals()["chal-a"].len(), 1);
}

#[tokio::test]
async fn stop_all_for_challenge_leaves_other_challenges_running() {
    let (dir, _store, scheduler) = scheduler();
    scheduler.start_interval("chal-a", "poll", "exit 0", dir.path(), Duration::from_secs(60));
    scheduler.start_interval("chal-b", "poll", "exit 0", dir.path(), Duration::from_secs(60));

    scheduler.stop_all_for_challenge("chal-a");

    let active = scheduler.get_active_intervals();
    assert!(!active.contains_key("chal-a"));
    assert!(active.contains_key("chal-b"));
}
