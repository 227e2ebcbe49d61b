use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::vcs;

/// Floor applied to a misconfigured (too-short) pull interval.
pub const MIN_PULL_INTERVAL: Duration = Duration::from_secs(60);

type RediscoverCallback = Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Periodically pulls an event root's git repository, invoking a rediscovery callback only when
/// HEAD actually advances (spec.md 4.7).
pub struct GitPuller {
    event_root: PathBuf,
    interval: Duration,
    on_update: RediscoverCallback,
}
impl GitPuller {
    pub fn new(event_root: PathBuf, interval: Duration, on_update: RediscoverCallback) -> Self {
        Self {
            event_root,
            interval: interval.max(MIN_PULL_INTERVAL),
            on_update,
        }
    }

    /// Runs the pull loop until `cancel` fires. An initial pull happens immediately, before the
    /// ticker arms.
    pub async fn run(&self, cancel: CancellationToken) {
        self.tick().await;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // consume the immediate tick; we already pulled once above

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => self.tick().await,
            }
        }
    }

    async fn tick(&self) {
        if !self.event_root.join(".git").is_dir() {
            warn!(path = %self.event_root.display(), "git pull skipped: no .git directory");
            return;
        }

        let before = match vcs::head_sha(&self.event_root).await {
            Ok(sha) => sha,
            Err(err) => {
                error!(path = %self.event_root.display(), error = %err, "failed to read HEAD before pull");
                return;
            }
        };

        if let Err(err) = vcs::pull(&self.event_root).await {
            error!(path = %self.event_root.display(), error = %err, "git pull failed");
            return;
        }

        let after = match vcs::head_sha(&self.event_root).await {
            Ok(sha) => sha,
            Err(err) => {
                error!(path = %self.event_root.display(), error = %err, "failed to read HEAD after pull");
                return;
            }
        };

        if before != after {
            info!(path = %self.event_root.display(), %before, %after, "git pull advanced HEAD, triggering rediscovery");
            (self.on_update)().await;
        }
    }
}
