use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ShellError;
use crate::shell;
use crate::store::PersistentStore;

/// The minimum accepted interval for an interval script (spec.md 4.4's "implementation-defined
/// floor").
pub const MIN_SCRIPT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default)]
pub struct ScriptMetrics {
    pub last_execution_time: Option<Instant>,
    pub execution_count: u64,
    pub last_error_message: Option<String>,
    pub last_duration: Option<Duration>,
    pub total_duration: Duration,
    pub is_interval: bool,
    pub interval: Option<Duration>,
}
impl ScriptMetrics {
    /// A serializable snapshot; `last_execution_time` is reported as seconds elapsed since then,
    /// since `Instant` carries no wall-clock meaning outside this process.
    fn to_view(&self) -> ScriptMetricsView {
        ScriptMetricsView {
            seconds_since_last_execution: self.last_execution_time.map(|t| t.elapsed().as_secs_f64()),
            execution_count: self.execution_count,
            last_error_message: self.last_error_message.clone(),
            last_duration: self.last_duration,
            total_duration: self.total_duration,
            is_interval: self.is_interval,
            interval: self.interval,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptMetricsView {
    pub seconds_since_last_execution: Option<f64>,
    pub execution_count: u64,
    pub last_error_message: Option<String>,
    pub last_duration: Option<Duration>,
    pub total_duration: Duration,
    pub is_interval: bool,
    pub interval: Option<Duration>,
}

struct IntervalHandle {
    cancel: CancellationToken,
}

/// Per-(challenge, script) one-shot and interval execution, with cancellation and metrics
/// tracking (spec.md 4.4).
pub struct ScriptScheduler {
    parent: CancellationToken,
    intervals: RwLock<HashMap<(String, String), IntervalHandle>>,
    metrics: Arc<RwLock<HashMap<(String, String), ScriptMetrics>>>,
    store: Arc<PersistentStore>,
    default_timeout: Duration,
}
impl ScriptScheduler {
    pub fn new(parent: CancellationToken, store: Arc<PersistentStore>, default_timeout: Duration) -> Self {
        Self {
            parent,
            intervals: RwLock::new(HashMap::new()),
            metrics: Arc::new(RwLock::new(HashMap::new())),
            store,
            default_timeout,
        }
    }

    /// Dispatches based on whether the script declares an interval: delegates to `start_interval`
    /// for interval scripts (returning immediately), or runs once and returns the execution
    /// result.
    pub async fn run_with_interval_support(
        &self,
        challenge: &str,
        script_name: &str,
        command: &str,
        cwd: &std::path::Path,
        interval: Option<Duration>,
    ) -> Result<(), ShellError> {
        match interval {
            Some(interval) => {
                self.start_interval(challenge, script_name, command, cwd, interval);
                Ok(())
            }
            None => {
                self.stop_interval_script(challenge, script_name);
                self.run_once(challenge, script_name, command, cwd).await
            }
        }
    }

    async fn run_once(
        &self,
        challenge: &str,
        script_name: &str,
        command: &str,
        cwd: &std::path::Path,
    ) -> Result<(), ShellError> {
        let key = (challenge.to_string(), script_name.to_string());
        self.record_start(&key, false, None);

        self.store.append_script_execution(
            challenge,
            script_name,
            "one-time",
            command,
            "started",
            None,
            None,
            None,
            None,
        );

        let start = Instant::now();
        let cancel = self.parent.child_token();
        let result = shell::run_with_timeout(command, cwd, self.default_timeout, &cancel).await;
        let duration = start.elapsed();

        self.record_end(&key, duration, result.as_ref().err());
        self.store.append_script_execution(
            challenge,
            script_name,
            "one-time",
            command,
            if result.is_ok() { "completed" } else { "failed" },
            Some(duration.as_nanos() as i64),
            None,
            result.as_ref().err().map(|e| e.to_string()).as_deref(),
            None,
        );

        result
    }

    /// Starts (or restarts) an interval worker for `(challenge, script_name)`. If one already
    /// exists it is cancelled first. The ticker does not fire immediately: the first execution
    /// happens after one interval elapses.
    pub fn start_interval(
        &self,
        challenge: &str,
        script_name: &str,
        command: &str,
        cwd: &std::path::Path,
        interval: Duration,
    ) {
        let interval = interval.max(MIN_SCRIPT_INTERVAL);
        self.stop_interval_script(challenge, script_name);

        let key = (challenge.to_string(), script_name.to_string());
        self.record_start(&key, true, Some(interval));

        let cancel = self.parent.child_token();
        self.intervals.write().insert(
            key.clone(),
            IntervalHandle {
                cancel: cancel.clone(),
            },
        );

        let command = command.to_string();
        let cwd = cwd.to_path_buf();
        let store = self.store.clone();
        let default_timeout = self.default_timeout;
        let metrics = self.metrics.clone();
        let challenge_owned = challenge.to_string();
        let script_owned = script_name.to_string();

        tokio::spawn(async move {
            info!(challenge = %challenge_owned, script = %script_owned, "interval script started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // consume the immediate first tick; the spec forbids firing on start

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        store.append_script_execution(
                            &challenge_owned, &script_owned, "interval", &command, "stopped",
                            None, None, None, None,
                        );
                        info!(challenge = %challenge_owned, script = %script_owned, "interval script stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        store.append_script_execution(
                            &challenge_owned, &script_owned, "interval", &command, "executing",
                            None, None, None, None,
                        );
                        let start = Instant::now();
                        let result = shell::run_with_timeout(&command, &cwd, default_timeout, &cancel).await;
                        let duration = start.elapsed();

                        {
                            let mut guard = metrics.write();
                            let entry = guard.entry(key.clone()).or_default();
                            entry.last_execution_time = Some(Instant::now());
                            entry.execution_count += 1;
                            entry.last_duration = Some(duration);
                            entry.total_duration += duration;
                            entry.last_error_message = result.as_ref().err().map(|e| e.to_string());
                        }

                        store.append_script_execution(
                            &challenge_owned, &script_owned, "interval", &command,
                            if result.is_ok() { "completed" } else { "failed" },
                            Some(duration.as_nanos() as i64), None,
                            result.as_ref().err().map(|e| e.to_string()).as_deref(), None,
                        );
                        if let Err(err) = result {
                            warn!(challenge = %challenge_owned, script = %script_owned, error = %err, "interval script execution failed");
                        }
                    }
                }
            }
        });
    }

    pub fn stop_interval_script(&self, challenge: &str, script_name: &str) {
        let key = (challenge.to_string(), script_name.to_string());
        if let Some(handle) = self.intervals.write().remove(&key) {
            handle.cancel.cancel();
        }
    }

    pub fn stop_all_for_challenge(&self, challenge: &str) {
        let keys: Vec<_> = self
            .intervals
            .read()
            .keys()
            .filter(|(ch, _)| ch == challenge)
            .cloned()
            .collect();
        for (ch, script) in keys {
            self.stop_interval_script(&ch, &script);
        }
    }

    /// Cancels every interval worker, then waits up to `grace` for things to settle. Workers that
    /// outlive the grace period are not forcibly killed.
    pub async fn stop_all(&self, grace: Duration) {
        let keys: Vec<_> = self.intervals.read().keys().cloned().collect();
        for (ch, script) in keys {
            self.stop_interval_script(&ch, &script);
        }
        tokio::time::sleep(grace).await;
    }

    pub fn get_active_intervals(&self) -> HashMap<String, Vec<String>> {
        let mut out: HashMap<String, Vec<String>> = HashMap::new();
        for (challenge, script) in self.intervals.read().keys() {
            out.entry(challenge.clone()).or_default().push(script.clone());
        }
        out
    }

    /// Returns a deep copy of the metrics table so callers can't retain a lock or mutate shared
    /// state.
    pub fn get_metrics(&self) -> HashMap<String, HashMap<String, ScriptMetricsView>> {
        let mut out: HashMap<String, HashMap<String, ScriptMetricsView>> = HashMap::new();
        for ((challenge, script), metrics) in self.metrics.read().iter() {
            out.entry(challenge.clone())
                .or_default()
                .insert(script.clone(), metrics.to_view());
        }
        out
    }

    fn record_start(&self, key: &(String, String), is_interval: bool, interval: Option<Duration>) {
        let mut guard = self.metrics.write();
        let entry = guard.entry(key.clone()).or_default();
        entry.is_interval = is_interval;
        entry.interval = interval;
    }

    fn record_end(&self, key: &(String, String), duration: Duration, err: Option<&ShellError>) {
        let mut guard = self.metrics.write();
        let entry = guard.entry(key.clone()).or_default();
        entry.last_execution_time = Some(Instant::now());
        entry.execution_count += 1;
        entry.last_duration = Some(duration);
        entry.total_duration += duration;
        entry.last_error_message = err.map(|e| e.to_string());
    }
}
