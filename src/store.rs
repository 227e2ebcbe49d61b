use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::error::StoreError;

/// SQLite-backed store for daemon logs, challenge state, script executions, and the
/// event/folder -> challenge-id mapping (spec.md 4.10). A single connection, serialized behind a
/// mutex, in WAL mode. Write APIs never fail a caller: errors are logged and swallowed so a
/// storage hiccup can't take down the watch loop.
pub struct PersistentStore {
    conn: Mutex<Connection>,
}
impl PersistentStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| StoreError::ParentDirFailed {
                path: parent.to_path_buf(),
                err,
            })?;
        }
        let conn = Connection::open(path).map_err(|err| StoreError::OpenFailed {
            path: path.to_path_buf(),
            err,
        })?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_millis(5000))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn append_log(&self, level: &str, component: &str, challenge: Option<&str>, script: Option<&str>, message: &str, error: Option<&str>, duration_ms: Option<i64>) {
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO watcher_logs (timestamp, level, component, challenge, script, message, error, duration_ms)
             VALUES (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), ?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![level, component, challenge, script, message, error, duration_ms],
        );
        if let Err(err) = result {
            eprintln!("persistent store: failed to append log: {err}");
        }
    }

    pub fn recent_logs(&self, limit: u32) -> Result<Vec<LogRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, level, component, challenge, script, message, error, duration_ms
             FROM watcher_logs ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(LogRecord {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                level: row.get(2)?,
                component: row.get(3)?,
                challenge: row.get(4)?,
                script: row.get(5)?,
                message: row.get(6)?,
                error: row.get(7)?,
                duration_ms: row.get(8)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub fn upsert_challenge_state(&self, challenge_name: &str, status: &str, error_message: Option<&str>, script_states_json: &str) {
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO challenge_states (challenge_name, status, last_update, error_message, script_states_json)
             VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), ?3, ?4)
             ON CONFLICT(challenge_name) DO UPDATE SET
                status = excluded.status,
                last_update = excluded.last_update,
                error_message = excluded.error_message,
                script_states_json = excluded.script_states_json",
            params![challenge_name, status, error_message, script_states_json],
        );
        if let Err(err) = result {
            eprintln!("persistent store: failed to upsert challenge state: {err}");
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn append_script_execution(&self, challenge_name: &str, script_name: &str, script_type: &str, command: &str, status: &str, duration_ns: Option<i64>, output: Option<&str>, error_output: Option<&str>, exit_code: Option<i32>) {
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO script_executions
                (timestamp, challenge_name, script_name, script_type, command, status, duration_ns, output, error_output, exit_code)
             VALUES (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                challenge_name,
                script_name,
                script_type,
                command,
                status,
                duration_ns,
                output,
                error_output,
                exit_code
            ],
        );
        if let Err(err) = result {
            eprintln!("persistent store: failed to append script execution: {err}");
        }
    }

    pub fn recent_script_executions(&self, limit: u32, challenge_name: Option<&str>) -> Result<Vec<ScriptExecutionRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, challenge_name, script_name, script_type, command, status, duration_ns, output, error_output, exit_code
             FROM script_executions
             WHERE ?1 IS NULL OR challenge_name = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![challenge_name, limit], |row| {
            Ok(ScriptExecutionRecord {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                challenge_name: row.get(2)?,
                script_name: row.get(3)?,
                script_type: row.get(4)?,
                command: row.get(5)?,
                status: row.get(6)?,
                duration_ns: row.get(7)?,
                output: row.get(8)?,
                error_output: row.get(9)?,
                exit_code: row.get(10)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Upserts a folder -> challenge mapping, keyed by `(event, folder_path)`. The challenge ID
    /// and title come from the CTF platform's own catalog, which this core never queries; callers
    /// are an external sync process, same collaborator boundary as `UpdateExecutor`.
    #[allow(dead_code)]
    pub fn upsert_folder_mapping(&self, event: &str, folder_path: &str, challenge_id: &str, challenge_title: &str) {
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO challenge_mappings (event, folder_path, challenge_id, challenge_title, last_synced)
             VALUES (?1, ?2, ?3, ?4, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
             ON CONFLICT(event, folder_path) DO UPDATE SET
                challenge_id = excluded.challenge_id,
                challenge_title = excluded.challenge_title,
                last_synced = excluded.last_synced",
            params![event, folder_path, challenge_id, challenge_title],
        );
        if let Err(err) = result {
            eprintln!("persistent store: failed to upsert folder mapping: {err}");
        }
    }

    /// Returns `None` if no mapping exists for `(event, folder_path)`, distinguishing absence
    /// from an I/O error.
    #[allow(dead_code)]
    pub fn folder_mapping(&self, event: &str, folder_path: &str) -> Result<Option<FolderMappingRecord>, StoreError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT challenge_id, challenge_title, last_synced FROM challenge_mappings
             WHERE event = ?1 AND folder_path = ?2",
            params![event, folder_path],
            |row| {
                Ok(FolderMappingRecord {
                    event: event.to_string(),
                    folder_path: folder_path.to_string(),
                    challenge_id: row.get(0)?,
                    challenge_title: row.get(1)?,
                    last_synced: row.get(2)?,
                })
            },
        )
        .map(Some)
        .or_else(|err| match err {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(StoreError::from(other)),
        })
    }
}

#[derive(Debug, Clone)]
pub struct LogRecord {
    pub id: i64,
    pub timestamp: String,
    pub level: String,
    pub component: String,
    pub challenge: Option<String>,
    pub script: Option<String>,
    pub message: String,
    pub error: Option<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ScriptExecutionRecord {
    pub id: i64,
    pub timestamp: String,
    pub challenge_name: String,
    pub script_name: String,
    pub script_type: String,
    pub command: String,
    pub status: String,
    pub duration_ns: Option<i64>,
    pub output: Option<String>,
    pub error_output: Option<String>,
    pub exit_code: Option<i32>,
}

/// An external-collaborator read view (see `folder_mapping`); this core's own code never
/// constructs one outside tests.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct FolderMappingRecord {
    pub event: String,
    pub folder_path: String,
    pub challenge_id: String,
    pub challenge_title: String,
    pub last_synced: String,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS watcher_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    level TEXT NOT NULL,
    component TEXT NOT NULL,
    challenge TEXT,
    script TEXT,
    message TEXT NOT NULL,
    error TEXT,
    duration_ms INTEGER
);
CREATE TABLE IF NOT EXISTS challenge_states (
    challenge_name TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    last_update TEXT NOT NULL,
    error_message TEXT,
    script_states_json TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS script_executions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    challenge_name TEXT NOT NULL,
    script_name TEXT NOT NULL,
    script_type TEXT NOT NULL,
    command TEXT NOT NULL,
    status TEXT NOT NULL,
    duration_ns INTEGER,
    output TEXT,
    error_output TEXT,
    exit_code INTEGER
);
CREATE TABLE IF NOT EXISTS challenge_mappings (
    event TEXT NOT NULL,
    folder_path TEXT NOT NULL,
    challenge_id TEXT NOT NULL,
    challenge_title TEXT NOT NULL,
    last_synced TEXT NOT NULL,
    PRIMARY KEY (event, folder_path)
);
";
