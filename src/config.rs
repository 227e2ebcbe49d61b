use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigError;

/// The global configuration for a watcher daemon instance. Starts uninstantiated; `main`
/// populates it once at startup from the loaded `WatcherConfig`.
pub static WATCHER_CONFIG: GlobalConfig = GlobalConfig::new();

/// A wrapper around the global configuration every part of the daemon shares.
///
/// **Important:** reading the global configuration should be done *once* per logical operation;
/// values obtained through separate `.get()` calls should be assumed independent.
pub struct GlobalConfig {
    config: RwLock<Option<WatcherConfig>>,
}
impl GlobalConfig {
    pub const fn new() -> Self {
        Self {
            config: RwLock::new(None),
        }
    }
    /// Gets the current state of the global configuration.
    ///
    /// # Panics
    ///
    /// Panics if the global configuration has not yet been instantiated.
    pub fn get(&self) -> MappedRwLockReadGuard<'_, WatcherConfig> {
        RwLockReadGuard::map(self.config.read(), |c| c.as_ref().unwrap())
    }
    pub fn set(&self, new_config: WatcherConfig) {
        *self.config.write() = Some(new_config);
    }
}

fn default_events() -> Vec<String> {
    Vec::new()
}
fn default_ignore_patterns() -> Vec<String> {
    vec!["*.swp".to_string(), "*.tmp".to_string()]
}
fn default_watch_patterns() -> Vec<String> {
    Vec::new()
}
fn default_script_timeout_secs() -> u64 {
    30
}
fn default_git_pull_interval_secs() -> u64 {
    300
}
fn default_state_dir() -> PathBuf {
    PathBuf::from(".gzcli/watcher")
}

/// Raw, deserializable configuration as loaded from TOML on disk.
#[derive(Deserialize)]
pub struct RawConfig {
    /// The names of the events (under `events/<name>/`) this daemon should watch. Empty means
    /// "discover every directory under `events/`".
    #[serde(default = "default_events")]
    pub events: Vec<String>,
    /// Extra glob patterns to ignore, in addition to the built-in editor-scratch-file rules.
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
    /// If non-empty, only basenames matching one of these globs are watched.
    #[serde(default = "default_watch_patterns")]
    pub watch_patterns: Vec<String>,
    /// Default timeout, in seconds, for a single script invocation.
    #[serde(default = "default_script_timeout_secs")]
    pub script_timeout_secs: u64,
    /// Whether to periodically pull each event's git repository.
    #[serde(default)]
    pub git_pull_enabled: bool,
    /// How often, in seconds, to pull. Floored to the scheduler's minimum pull interval.
    #[serde(default = "default_git_pull_interval_secs")]
    pub git_pull_interval_secs: u64,
}
impl Default for RawConfig {
    fn default() -> Self {
        Self {
            events: default_events(),
            ignore_patterns: default_ignore_patterns(),
            watch_patterns: default_watch_patterns(),
            script_timeout_secs: default_script_timeout_secs(),
            git_pull_enabled: false,
            git_pull_interval_secs: default_git_pull_interval_secs(),
        }
    }
}

/// A glob pattern compiled once into an anchored regex, per spec.md 4.2.
pub struct CompiledPattern {
    regex: Regex,
}
impl CompiledPattern {
    pub fn compile(glob: &str) -> Result<Self, ConfigError> {
        let regex =
            Regex::new(&glob_to_anchored_regex(glob)).map_err(|err| ConfigError::InvalidPattern {
                pattern: glob.to_string(),
                err,
            })?;
        Ok(Self { regex })
    }
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Converts an exported glob (`*` = any run of characters, `?` = a single character) into an
/// anchored regex pattern.
fn glob_to_anchored_regex(glob: &str) -> String {
    let mut out = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    out
}

/// The fully resolved, validated configuration used throughout the daemon.
pub struct WatcherConfig {
    /// The root directory containing `events/<name>/...`.
    pub cwd: PathBuf,
    pub events: Vec<String>,
    pub ignore_patterns: Vec<CompiledPattern>,
    pub watch_patterns: Vec<CompiledPattern>,
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
    pub db_path: PathBuf,
    pub socket_path: PathBuf,
    pub script_timeout: Duration,
    pub git_pull_enabled: bool,
    pub git_pull_interval: Duration,
}
impl WatcherConfig {
    /// Loads configuration from `<dir>/.gzcli/watcher.toml`, falling back to defaults if absent,
    /// then resolves the default on-disk state paths and validates the result.
    pub fn from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let config_path = dir.join(".gzcli/watcher.toml");
        let raw: RawConfig = if config_path.exists() {
            let contents =
                std::fs::read_to_string(&config_path).map_err(|err| ConfigError::ReadFailed {
                    path: config_path.clone(),
                    err,
                })?;
            toml::from_str(&contents).map_err(|err| ConfigError::ParseFailed {
                path: config_path.clone(),
                err,
            })?
        } else {
            RawConfig::default()
        };

        let state_dir = dir.join(default_state_dir());
        let ignore_patterns = raw
            .ignore_patterns
            .iter()
            .map(|p| CompiledPattern::compile(p))
            .collect::<Result<Vec<_>, _>>()?;
        let watch_patterns = raw
            .watch_patterns
            .iter()
            .map(|p| CompiledPattern::compile(p))
            .collect::<Result<Vec<_>, _>>()?;

        let events = if raw.events.is_empty() {
            discover_event_names(dir)
        } else {
            raw.events
        };
        if events.is_empty() {
            return Err(ConfigError::NoEvents);
        }
        for event in &events {
            let root = dir.join("events").join(event);
            if !root.is_dir() {
                return Err(ConfigError::InvalidEventRoot { path: root });
            }
        }

        Ok(Self {
            cwd: dir.to_path_buf(),
            events,
            ignore_patterns,
            watch_patterns,
            pid_file: state_dir.join("watcher.pid"),
            log_file: state_dir.join("watcher.log"),
            db_path: state_dir.join("watcher.db"),
            socket_path: state_dir.join("watcher.sock"),
            script_timeout: Duration::from_secs(raw.script_timeout_secs),
            git_pull_enabled: raw.git_pull_enabled,
            git_pull_interval: Duration::from_secs(raw.git_pull_interval_secs),
        })
    }
    /// The absolute root directory for a configured event.
    pub fn event_root(&self, event: &str) -> PathBuf {
        self.cwd.join("events").join(event)
    }
}

fn discover_event_names(dir: &Path) -> Vec<String> {
    let events_dir = dir.join("events");
    let Ok(entries) = std::fs::read_dir(&events_dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect()
}
