use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::coalescer::{drive_cycle, UpdateCoalescer};

#[tokio::test]
async fn single_event_runs_once() {
    let coalescer = UpdateCoalescer::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let path = coalescer.notify("alpha", PathBuf::from("foo")).await;
    assert_eq!(path, Some(PathBuf::from("foo")));

    let calls_clone = calls.clone();
    drive_cycle(&coalescer, "alpha", path.unwrap(), |_| {
        let calls_clone = calls_clone.clone();
        async move {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }
    })
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!coalescer.is_updating("alpha").await);
}

#[tokio::test]
async fn second_event_while_updating_is_coalesced() {
    let coalescer = UpdateCoalescer::new();

    let first = coalescer.notify("alpha", PathBuf::from("foo")).await;
    assert_eq!(first, Some(PathBuf::from("foo")));
    assert!(coalescer.is_updating("alpha").await);

    // A second event arrives while the cycle is "running" (we haven't called complete yet).
    let second = coalescer.notify("alpha", PathBuf::from("bar")).await;
    assert_eq!(second, None);

    // Completing should hand back the pending path rather than clearing the flag.
    let next = coalescer.complete("alpha").await;
    assert_eq!(next, Some(PathBuf::from("bar")));
    assert!(coalescer.is_updating("alpha").await);

    let next = coalescer.complete("alpha").await;
    assert_eq!(next, None);
    assert!(!coalescer.is_updating("alpha").await);
}

#[tokio::test]
async fn burst_collapses_to_latest_path() {
    let coalescer = Arc::new(UpdateCoalescer::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let first = coalescer.notify("alpha", PathBuf::from("p0")).await.unwrap();

    let mut handles = Vec::new();
    for i in 1..=100 {
        let coalescer = coalescer.clone();
        handles.push(tokio::spawn(async move {
            coalescer.notify("alpha", PathBuf::from(format!("p{i}"))).await
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let calls_clone = calls.clone();
    drive_cycle(&coalescer, "alpha", first, move |_path| {
        let calls_clone = calls_clone.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }
    })
    .await;

    // At most one in-flight run plus one chained run from the burst.
    assert!(calls.load(Ordering::SeqCst) <= 2);
    assert!(!coalescer.is_updating("alpha").await);
}
