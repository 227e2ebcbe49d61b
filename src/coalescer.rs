use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;

/// Per-challenge state for the coalescer, guarded by its own mutex so the outer map lock is never
/// held across an update cycle.
#[derive(Default)]
struct CoalesceState {
    updating: bool,
    pending: Option<PathBuf>,
}

/// Enforces at-most-one in-flight update per challenge, with lossless latest-wins coalescing of
/// overlapping changes (spec.md 4.5). Callers provide the cycle body as an async closure; the
/// coalescer is otherwise ignorant of what an update does.
pub struct UpdateCoalescer {
    states: RwLock<HashMap<String, Arc<Mutex<CoalesceState>>>>,
}
impl UpdateCoalescer {
    pub fn new() -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
        }
    }

    fn state_for(&self, challenge: &str) -> Arc<Mutex<CoalesceState>> {
        if let Some(state) = self.states.read().get(challenge) {
            return state.clone();
        }
        self.states
            .write()
            .entry(challenge.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(CoalesceState::default())))
            .clone()
    }

    /// Notifies the coalescer that `path` changed within `challenge`. If an update cycle is
    /// already running for this challenge, the path is recorded as the latest pending change and
    /// this call returns `None` — the in-flight cycle will pick it up. Otherwise, the caller is
    /// handed the starting path to launch a fresh cycle with, having already flipped the
    /// `updating` flag.
    pub async fn notify(&self, challenge: &str, path: PathBuf) -> Option<PathBuf> {
        let state = self.state_for(challenge);
        let mut guard = state.lock().await;
        if guard.updating {
            guard.pending = Some(path);
            None
        } else {
            guard.updating = true;
            Some(path)
        }
    }

    /// Called by the cycle runner after it finishes processing `path` for `challenge`. Returns
    /// the next path to process immediately if one arrived while the cycle ran, clearing
    /// `pending`; otherwise clears the `updating` flag and the cycle is done.
    pub async fn complete(&self, challenge: &str) -> Option<PathBuf> {
        let state = self.state_for(challenge);
        let mut guard = state.lock().await;
        match guard.pending.take() {
            Some(next) => Some(next),
            None => {
                guard.updating = false;
                None
            }
        }
    }

    /// True if an update cycle is currently running for `challenge`. Exposed for tests and status
    /// reporting; not used as a gate anywhere in the protocol.
    pub async fn is_updating(&self, challenge: &str) -> bool {
        self.state_for(challenge).lock().await.updating
    }

    /// Drops all per-challenge state, e.g. when a challenge is unregistered.
    pub fn forget(&self, challenge: &str) {
        self.states.write().remove(challenge);
    }
}
impl Default for UpdateCoalescer {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives a single challenge's update cycle to completion against a coalescer, re-running with
/// the latest pending path for as long as one keeps arriving (spec.md 4.5's async update cycle).
/// `run_once` executes the externally-supplied business logic for one path.
pub async fn drive_cycle<F, Fut>(coalescer: &UpdateCoalescer, challenge: &str, mut path: PathBuf, run_once: F)
where
    F: Fn(PathBuf) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    loop {
        run_once(path.clone()).await;
        match coalescer.complete(challenge).await {
            Some(next) => path = next,
            None => break,
        }
    }
}
