use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{
    event::{CreateKind, ModifyKind, RemoveKind},
    EventKind as NotifyEventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use parking_lot::RwLock;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::challenge::{find_challenge_yaml, ChallengeConfig, ChallengeDescriptor, ChallengeYamlLoader};
use crate::challenge_index::ChallengeIndex;
use crate::classifier::{self, UpdateType};
use crate::coalescer::{drive_cycle, UpdateCoalescer};
use crate::error::WatcherError;
use crate::event_filter::{self, FsOp, RawEvent};
use crate::git_puller::GitPuller;
use crate::scheduler::ScriptScheduler;
use crate::store::PersistentStore;
use crate::update::UpdateExecutor;

/// Owns the state for a single configured event: its native watcher handle, challenge index,
/// script scheduler, update coalescer, and a shared handle to the persistent store (spec.md 4.6).
pub struct EventWatcher {
    pub name: String,
    root: PathBuf,
    index: Arc<ChallengeIndex>,
    scheduler: Arc<ScriptScheduler>,
    coalescer: Arc<UpdateCoalescer>,
    store: Arc<PersistentStore>,
    executor: Arc<dyn UpdateExecutor>,
    loader: Arc<dyn ChallengeYamlLoader>,
    cancel: CancellationToken,
    git_pull_enabled: bool,
    git_pull_interval: Duration,
    watcher: std::sync::Mutex<Option<RecommendedWatcher>>,
    /// The most recently loaded descriptor per challenge, kept so `metrics()` can re-derive
    /// `is_interval`/`interval` from the live configuration rather than from what the scheduler
    /// last recorded at execution time (spec.md 4.4).
    configs: RwLock<std::collections::HashMap<String, ChallengeConfig>>,
}
impl EventWatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        root: PathBuf,
        store: Arc<PersistentStore>,
        executor: Arc<dyn UpdateExecutor>,
        loader: Arc<dyn ChallengeYamlLoader>,
        parent_cancel: &CancellationToken,
        script_timeout: Duration,
        git_pull_enabled: bool,
        git_pull_interval: Duration,
    ) -> Result<Self, WatcherError> {
        if !root.is_dir() {
            return Err(WatcherError::InvalidRoot { path: root });
        }
        let cancel = parent_cancel.child_token();
        let scheduler = Arc::new(ScriptScheduler::new(cancel.clone(), store.clone(), script_timeout));
        Ok(Self {
            name,
            root,
            index: Arc::new(ChallengeIndex::new()),
            scheduler,
            coalescer: Arc::new(UpdateCoalescer::new()),
            store,
            executor,
            loader,
            cancel,
            git_pull_enabled,
            git_pull_interval,
            watcher: std::sync::Mutex::new(None),
            configs: RwLock::new(std::collections::HashMap::new()),
        })
    }

    /// Walks the event root for `challenge.yml`/`challenge.yaml` files and registers each as a
    /// challenge.
    pub fn discover_challenges(self: &Arc<Self>) {
        for entry in WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_dir() {
                continue;
            }
            if find_challenge_yaml(entry.path()).is_some() {
                self.register_challenge(entry.path());
            }
        }
    }

    fn register_challenge(self: &Arc<Self>, root: &Path) {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let watched_dirs = self.index.register(&name, root);

        if let Some(watcher) = self.watcher.lock().unwrap().as_mut() {
            for dir in &watched_dirs {
                if let Err(err) = watcher.watch(dir, RecursiveMode::NonRecursive) {
                    warn!(path = %dir.display(), error = %err, "failed to subscribe subdirectory, continuing with partial coverage");
                }
            }
        }

        self.store.upsert_challenge_state(&name, "watching", None, "{}");
        info!(event = %self.name, challenge = %name, "challenge registered");

        if let Some(yaml_path) = find_challenge_yaml(root) {
            if let Ok(config) = self.loader.load(&yaml_path, root) {
                self.configs.write().insert(name.clone(), config.clone());
                let this = self.clone();
                let name = name.clone();
                tokio::spawn(async move { this.start_configured_scripts(&name, &config).await });
            }
        }
    }

    async fn start_configured_scripts(&self, challenge_name: &str, config: &crate::challenge::ChallengeConfig) {
        use crate::challenge::ScriptDescriptor;
        info!(event = %self.name, challenge = %config.name(), scripts = config.scripts().len(), "starting configured scripts");
        for (script_name, script) in config.scripts() {
            if let Err(err) = self
                .scheduler
                .run_with_interval_support(challenge_name, script_name, script.command(), config.cwd(), script.interval())
                .await
            {
                warn!(challenge = %challenge_name, script = %script_name, error = %err, "failed to start configured script");
            }
        }
    }

    /// Starts the watch loop (and, if configured, the git-pull loop) as spawned tasks. Returns
    /// immediately; the caller retains `self` in an `Arc` for the lifetime of the watcher.
    pub fn start(self: &Arc<Self>) -> Result<(), WatcherError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let root = self.root.clone();

        let mut watcher = notify::recommended_watcher(move |ev: Result<notify::Event, notify::Error>| {
            if let Ok(ev) = ev {
                let _ = translate_and_send(&tx, ev);
            }
        })?;
        watcher.watch(&root, RecursiveMode::NonRecursive)?;
        *self.watcher.lock().unwrap() = Some(watcher);

        self.discover_challenges();

        let this = self.clone();
        tokio::spawn(async move { this.watch_loop(rx).await });

        if self.git_pull_enabled {
            let this = self.clone();
            tokio::spawn(async move { this.git_pull_loop().await });
        }

        self.store.append_log("INFO", "event_watcher", None, None, &format!("event_watcher started: {}", self.name), None, None);
        Ok(())
    }

    async fn watch_loop(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<RawEvent>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    self.handle_raw_event(event).await;
                }
            }
        }
    }

    async fn handle_raw_event(self: &Arc<Self>, event: RawEvent) {
        let accepted = {
            let config = crate::config::WATCHER_CONFIG.get();
            event_filter::accept(&event, &config)
        };
        if !accepted {
            return;
        }

        match event.op {
            FsOp::Remove | FsOp::Rename => self.handle_file_removal(&event.path),
            _ => {
                if event.path.exists() {
                    self.handle_file_change(event.path).await;
                }
            }
        }
    }

    /// A path disappeared. If it was a challenge root or its descriptor file, the challenge is
    /// unregistered; otherwise this is a no-op (external policy around grace periods is left to
    /// the caller per spec.md's open question on removal timing).
    fn handle_file_removal(&self, path: &Path) {
        let Some(owner) = self.index.lookup(path) else {
            debug!(path = %path.display(), "removal of untracked path, ignoring");
            return;
        };
        let is_root_removal = path == owner.challenge_root
            || crate::challenge::CHALLENGE_YAML_NAMES
                .iter()
                .any(|name| owner.challenge_root.join(name) == *path);
        if is_root_removal && !owner.challenge_root.exists() {
            self.scheduler.stop_all_for_challenge(&owner.challenge_name);
            self.index.unregister(&owner.challenge_name);
            self.coalescer.forget(&owner.challenge_name);
            self.store.upsert_challenge_state(&owner.challenge_name, "error", Some("challenge root removed"), "{}");
            info!(event = %self.name, challenge = %owner.challenge_name, "challenge unregistered after removal");
        }
    }

    async fn handle_file_change(self: &Arc<Self>, path: PathBuf) {
        let Some(owner) = self.index.lookup(&path) else {
            debug!(path = %path.display(), "no owning challenge for changed path, dropping");
            return;
        };

        let Some(start_path) = self.coalescer.notify(&owner.challenge_name, path).await else {
            return;
        };

        let this = self.clone();
        let challenge_name = owner.challenge_name.clone();
        let challenge_root = owner.challenge_root.clone();
        tokio::spawn(async move {
            this.store.upsert_challenge_state(&challenge_name, "updating", None, "{}");
            let this2 = this.clone();
            let challenge_root2 = challenge_root.clone();
            let challenge_name_for_cycle = challenge_name.clone();
            drive_cycle(&this.coalescer, &challenge_name_for_cycle, start_path, move |path| {
                let this2 = this2.clone();
                let challenge_root2 = challenge_root2.clone();
                let challenge_name = challenge_name.clone();
                async move {
                    let update_type = classifier::classify_absolute(&path, &challenge_root2);
                    if update_type == UpdateType::None {
                        return;
                    }
                    if let Err(err) = this2
                        .executor
                        .apply(&challenge_name, &path, update_type)
                        .await
                    {
                        error!(challenge = %challenge_name, error = %err, "update executor failed");
                        this2.store.upsert_challenge_state(&challenge_name, "error", Some(&err.to_string()), "{}");
                    }
                }
            })
            .await;
            this.store.upsert_challenge_state(&challenge_name_for_cycle, "watching", None, "{}");
        });
    }

    async fn git_pull_loop(self: Arc<Self>) {
        let this = self.clone();
        let puller = GitPuller::new(self.root.clone(), self.git_pull_interval, Box::new(move || {
            let this = this.clone();
            Box::pin(async move { this.discover_challenges() })
        }));
        puller.run(self.cancel.clone()).await;
    }

    /// Cancels every spawned task and waits briefly before returning. Matches spec.md 4.6's
    /// `stop_all(5s)` on the scheduler followed by a best-effort 10s join budget.
    pub async fn stop(&self) {
        self.scheduler.stop_all(Duration::from_secs(5)).await;
        self.cancel.cancel();
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.store.append_log("INFO", "event_watcher", None, None, &format!("stopped: {}", self.name), None, None);
    }

    pub fn status(&self) -> serde_json::Value {
        json!({
            "event": self.name,
            "active_scripts": self.scheduler.get_active_intervals(),
        })
    }

    pub fn list_challenges(&self) -> Vec<serde_json::Value> {
        self.index
            .registered()
            .into_iter()
            .map(|(name, _root)| json!({"event": self.name, "name": name, "watching": true}))
            .collect()
    }

    /// Per spec.md 4.4: `is_interval`/`interval` are re-derived here from the challenge's current
    /// configuration, not trusted from what the scheduler recorded at the script's last execution
    /// — so a script reclassified from interval to one-shot (or vice versa) reports correctly even
    /// before its next run. Scripts with no current config entry (already unregistered) keep
    /// whatever the scheduler last recorded.
    pub fn metrics(&self) -> std::collections::HashMap<String, std::collections::HashMap<String, crate::scheduler::ScriptMetricsView>> {
        use crate::challenge::ScriptDescriptor;
        let configs = self.configs.read();
        let mut metrics = self.scheduler.get_metrics();
        for (challenge_name, scripts) in metrics.iter_mut() {
            let Some(config) = configs.get(challenge_name) else {
                continue;
            };
            for (script_name, view) in scripts.iter_mut() {
                if let Some(script) = config.scripts.get(script_name) {
                    view.interval = script.interval();
                    view.is_interval = script.interval().is_some();
                }
            }
        }
        metrics
    }

    pub fn stop_script(&self, challenge_name: &str, script_name: &str) {
        self.scheduler.stop_interval_script(challenge_name, script_name);
    }

    /// Per spec.md's open question: the source only toggles status, so this core only exposes
    /// the two state transitions and leaves the actual restart work to an external collaborator.
    pub fn restart_challenge(&self, challenge_name: &str) {
        self.store.upsert_challenge_state(challenge_name, "restarting", None, "{}");
        self.store.upsert_challenge_state(challenge_name, "watching", None, "{}");
    }
}

fn translate_and_send(
    tx: &mpsc::UnboundedSender<RawEvent>,
    ev: notify::Event,
) -> Result<(), mpsc::error::SendError<RawEvent>> {
    let op = match ev.kind {
        NotifyEventKind::Create(CreateKind::Folder) => return Ok(()),
        NotifyEventKind::Create(_) => FsOp::Create,
        NotifyEventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Other) => FsOp::Write,
        NotifyEventKind::Modify(ModifyKind::Name(_)) => FsOp::Rename,
        NotifyEventKind::Modify(ModifyKind::Metadata(_)) => return Ok(()),
        NotifyEventKind::Remove(RemoveKind::Folder) => return Ok(()),
        NotifyEventKind::Remove(_) => FsOp::Remove,
        NotifyEventKind::Access(_) | NotifyEventKind::Any | NotifyEventKind::Other => return Ok(()),
    };
    for path in ev.paths {
        tx.send(RawEvent { path, op })?;
    }
    Ok(())
}
