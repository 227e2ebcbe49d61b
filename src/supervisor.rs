use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::challenge::{ChallengeYamlLoader, YamlChallengeLoader};
use crate::config::WatcherConfig;
use crate::error::WatcherError;
use crate::event_watcher::EventWatcher;
use crate::protocol::{Command, Response};
use crate::store::PersistentStore;
use crate::update::{LoggingUpdateExecutor, UpdateExecutor};

/// Parent of every configured `EventWatcher`; owns the shared store and dispatches control
/// commands, fanning out across the current set of watchers (spec.md 4.8).
pub struct Supervisor {
    watchers: RwLock<HashMap<String, Arc<EventWatcher>>>,
    store: Arc<PersistentStore>,
    root: CancellationToken,
}
impl Supervisor {
    pub fn new(store: Arc<PersistentStore>) -> Self {
        Self {
            watchers: RwLock::new(HashMap::new()),
            store,
            root: CancellationToken::new(),
        }
    }

    /// Starts an `EventWatcher` for each configured event and registers it under its name.
    pub fn start_all(self: &Arc<Self>, config: &WatcherConfig) -> Result<(), WatcherError> {
        let executor: Arc<dyn UpdateExecutor> = Arc::new(LoggingUpdateExecutor);
        let loader: Arc<dyn ChallengeYamlLoader> = Arc::new(YamlChallengeLoader);

        for event in &config.events {
            if self.watchers.read().contains_key(event) {
                return Err(WatcherError::AlreadyRunning(event.clone()));
            }
            let root: PathBuf = config.event_root(event);
            let watcher = Arc::new(EventWatcher::new(
                event.clone(),
                root,
                self.store.clone(),
                executor.clone(),
                loader.clone(),
                &self.root,
                config.script_timeout,
                config.git_pull_enabled,
                config.git_pull_interval,
            )?);
            watcher.start()?;
            self.watchers.write().insert(event.clone(), watcher);
            info!(event = %event, "event watcher started");
        }
        Ok(())
    }

    pub fn get_event_watcher(&self, name: &str) -> Option<Arc<EventWatcher>> {
        self.watchers.read().get(name).cloned()
    }

    /// A point-in-time snapshot of the currently registered watchers.
    pub fn get_all_event_watchers(&self) -> Vec<Arc<EventWatcher>> {
        self.watchers.read().values().cloned().collect()
    }

    pub async fn stop_event_watcher(&self, name: &str) -> bool {
        let watcher = self.watchers.write().remove(name);
        match watcher {
            Some(watcher) => {
                watcher.stop().await;
                true
            }
            None => false,
        }
    }

    pub async fn shutdown(&self) {
        let watchers = self.get_all_event_watchers();
        for watcher in &watchers {
            watcher.stop().await;
        }
        self.root.cancel();
        tokio::time::sleep(Duration::from_secs(1)).await;
        warn!("supervisor shutdown complete");
    }

    /// Dispatches a single control command, returning the response to write back to the client.
    pub async fn handle_command(&self, command: Command) -> Response {
        let watchers = match &command.event {
            Some(event) => match self.get_event_watcher(event) {
                Some(w) => vec![w],
                None if command.action == "status" => Vec::new(),
                None => return Response::err(WatcherError::UnknownEvent(event.clone()).to_string()),
            },
            None => self.get_all_event_watchers(),
        };

        match command.action.as_str() {
            "status" => self.handle_status(&command, &watchers),
            "list_challenges" => {
                let challenges: Vec<Value> = watchers.iter().flat_map(|w| w.list_challenges()).collect();
                Response::ok(json!({"challenges": challenges}))
            }
            "get_metrics" => {
                let mut metrics = serde_json::Map::new();
                for watcher in &watchers {
                    metrics.insert(watcher.name.clone(), json!(watcher.metrics()));
                }
                Response::ok(json!({"metrics": metrics}))
            }
            "get_logs" => self.handle_get_logs(&command),
            "get_script_executions" => self.handle_get_script_executions(&command),
            "stop_script" => self.handle_stop_script(&command),
            "restart_challenge" => self.handle_restart_challenge(&command),
            "stop_event" => self.handle_stop_event(&command).await,
            other => Response::unknown_action(other),
        }
    }

    fn handle_status(&self, command: &Command, watchers: &[Arc<EventWatcher>]) -> Response {
        let events: Vec<&str> = watchers.iter().map(|w| w.name.as_str()).collect();
        let watched_challenges: usize = watchers.iter().map(|w| w.list_challenges().len()).sum();
        let mut active_scripts = serde_json::Map::new();
        for watcher in watchers {
            active_scripts.insert(watcher.name.clone(), json!(watcher.status()["active_scripts"]));
        }
        let _ = command;
        Response::ok(json!({
            "status": "running",
            "events": events,
            "watched_challenges": watched_challenges,
            "active_scripts": active_scripts,
            "database_enabled": true,
            "socket_enabled": true,
        }))
    }

    fn handle_get_logs(&self, command: &Command) -> Response {
        let limit = limit_from(command).unwrap_or(100);
        match self.store.recent_logs(limit) {
            Ok(logs) => Response::ok(json!({"logs": logs.iter().map(log_to_json).collect::<Vec<_>>()})),
            Err(err) => Response::err(err.to_string()),
        }
    }

    fn handle_get_script_executions(&self, command: &Command) -> Response {
        let limit = limit_from(command).unwrap_or(100);
        let challenge_name = command
            .data
            .as_ref()
            .and_then(|d| d.get("challenge_name"))
            .and_then(|v| v.as_str());
        match self.store.recent_script_executions(limit, challenge_name) {
            Ok(executions) => {
                Response::ok(json!({"executions": executions.iter().map(execution_to_json).collect::<Vec<_>>()}))
            }
            Err(err) => Response::err(err.to_string()),
        }
    }

    fn handle_stop_script(&self, command: &Command) -> Response {
        let Some(event) = &command.event else {
            return Response::err("'event' is required for stop_script");
        };
        let Some(watcher) = self.get_event_watcher(event) else {
            return Response::err(WatcherError::UnknownEvent(event.clone()).to_string());
        };
        let (Some(challenge_name), Some(script_name)) = (
            command.data.as_ref().and_then(|d| d.get("challenge_name")).and_then(|v| v.as_str()),
            command.data.as_ref().and_then(|d| d.get("script_name")).and_then(|v| v.as_str()),
        ) else {
            return Response::err("'challenge_name' and 'script_name' are required for stop_script");
        };
        watcher.stop_script(challenge_name, script_name);
        Response::ok_message("script stopped")
    }

    fn handle_restart_challenge(&self, command: &Command) -> Response {
        let Some(event) = &command.event else {
            return Response::err("'event' is required for restart_challenge");
        };
        let Some(watcher) = self.get_event_watcher(event) else {
            return Response::err(WatcherError::UnknownEvent(event.clone()).to_string());
        };
        let Some(challenge_name) = command.data.as_ref().and_then(|d| d.get("challenge_name")).and_then(|v| v.as_str()) else {
            return Response::err("'challenge_name' is required for restart_challenge");
        };
        watcher.restart_challenge(challenge_name);
        Response::ok_message("restart initiated")
    }

    async fn handle_stop_event(&self, command: &Command) -> Response {
        let Some(event) = &command.event else {
            return Response::err("'event' is required for stop_event");
        };
        if self.stop_event_watcher(event).await {
            Response::ok_message(format!("event '{event}' stopped"))
        } else {
            Response::err(WatcherError::UnknownEvent(event.clone()).to_string())
        }
    }
}

fn limit_from(command: &Command) -> Option<u32> {
    command
        .data
        .as_ref()
        .and_then(|d| d.get("limit"))
        .and_then(|v| v.as_u64())
        .map(|v| v as u32)
}

fn log_to_json(log: &crate::store::LogRecord) -> Value {
    json!({
        "id": log.id,
        "timestamp": log.timestamp,
        "level": log.level,
        "component": log.component,
        "challenge": log.challenge,
        "script": log.script,
        "message": log.message,
        "error": log.error,
        "duration_ms": log.duration_ms,
    })
}

fn execution_to_json(execution: &crate::store::ScriptExecutionRecord) -> Value {
    json!({
        "id": execution.id,
        "timestamp": execution.timestamp,
        "challenge_name": execution.challenge_name,
        "script_name": execution.script_name,
        "script_type": execution.script_type,
        "command": execution.command,
        "status": execution.status,
        "duration_ns": execution.duration_ns,
        "output": execution.output,
        "error_output": execution.error_output,
        "exit_code": execution.exit_code,
    })
}
