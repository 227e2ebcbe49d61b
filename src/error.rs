use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when loading or validating the daemon's configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file at '{path:?}'")]
    ReadFailed {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to parse config file at '{path:?}'")]
    ParseFailed {
        path: PathBuf,
        #[source]
        err: toml::de::Error,
    },
    #[error("configured event root '{path:?}' does not exist or is not a directory")]
    InvalidEventRoot { path: PathBuf },
    #[error("watcher config has no configured events")]
    NoEvents,
    #[error("failed to compile pattern '{pattern}'")]
    InvalidPattern {
        pattern: String,
        #[source]
        err: regex::Error,
    },
}

/// Errors surfaced while parsing a single `challenge.yml`/`challenge.yaml` descriptor.
#[derive(Error, Debug)]
pub enum ChallengeConfigError {
    #[error("failed to read challenge descriptor at '{path:?}'")]
    ReadFailed {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to parse challenge descriptor at '{path:?}'")]
    ParseFailed {
        path: PathBuf,
        #[source]
        err: serde_yaml::Error,
    },
    #[error("failed to parse interval '{value}' on script '{script}' in '{path:?}'")]
    InvalidInterval {
        path: PathBuf,
        script: String,
        value: String,
        #[source]
        err: humantime::DurationError,
    },
}

/// Errors from starting or running a single event watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("event root '{path:?}' does not exist or is not a directory")]
    InvalidRoot { path: PathBuf },
    #[error("failed to start native filesystem watcher")]
    Notify(#[from] notify::Error),
    #[error("event '{0}' is already running")]
    AlreadyRunning(String),
    #[error("event '{0}' is not known to this supervisor")]
    UnknownEvent(String),
}

/// Errors from running the shell-execution primitive.
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("failed to launch command '{command}'")]
    LaunchFailed {
        command: String,
        #[source]
        err: std::io::Error,
    },
    #[error("command '{command}' timed out after {timeout_secs}s")]
    TimedOut { command: String, timeout_secs: u64 },
    #[error("command '{command}' was cancelled")]
    Cancelled { command: String },
    #[error("command '{command}' exited with status {code:?}: {stderr}")]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Errors from invoking the external version-control tool.
#[derive(Error, Debug)]
pub enum VcsError {
    #[error("'{path:?}' has no .git directory")]
    NotARepo { path: PathBuf },
    #[error(transparent)]
    Shell(#[from] ShellError),
    #[error("could not decode git output as UTF-8")]
    InvalidOutput,
}

/// Errors from the persistent SQLite-backed store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to create parent directory '{path:?}' for database")]
    ParentDirFailed {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to open database at '{path:?}'")]
    OpenFailed {
        path: PathBuf,
        #[source]
        err: rusqlite::Error,
    },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Errors from the Unix-socket control server.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum ControlError {
    #[error("failed to bind control socket at '{path:?}'")]
    BindFailed {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to remove stale socket at '{path:?}'")]
    StaleSocketRemovalFailed {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to create socket parent directory '{path:?}'")]
    ParentDirFailed {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}

/// Errors an `UpdateExecutor` implementation may return; opaque to the coalescer, which only
/// logs and records them. `LoggingUpdateExecutor` never fails, so only a real, externally
/// supplied executor constructs a variant here.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[allow(dead_code)]
    #[error("{0}")]
    Other(String),
}
