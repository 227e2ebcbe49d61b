mod challenge;
mod challenge_index;
mod classifier;
mod coalescer;
mod config;
mod control_server;
mod error;
mod event_filter;
mod event_watcher;
mod git_puller;
mod logging;
mod protocol;
mod scheduler;
mod shell;
mod store;
mod supervisor;
#[cfg(test)]
mod tests;
mod update;
mod vcs;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use config::{WatcherConfig, WATCHER_CONFIG};
use control_server::ControlServer;
use protocol::{Command, Response};
use store::PersistentStore;
use supervisor::Supervisor;

#[derive(Parser)]
#[command(name = "gzwatcher", about = "CTF challenge filesystem watcher daemon")]
struct Cli {
    /// Root directory containing events/<name>/... Defaults to the current directory.
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the daemon in the foreground.
    Run,
    /// Query daemon status.
    Status {
        #[arg(long)]
        event: Option<String>,
    },
    /// List known challenges.
    ListChallenges,
    /// Fetch per-script execution metrics.
    GetMetrics,
    /// Fetch recent structured log entries.
    GetLogs {
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Fetch recent script execution records.
    GetScriptExecutions {
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        challenge_name: Option<String>,
    },
    /// Stop one interval script for a challenge.
    StopScript {
        #[arg(long)]
        event: String,
        #[arg(long)]
        challenge_name: String,
        #[arg(long)]
        script_name: String,
    },
    /// Trigger the restart transition for a challenge.
    RestartChallenge {
        #[arg(long)]
        event: String,
        #[arg(long)]
        challenge_name: String,
    },
    /// Stop one event watcher.
    StopEvent {
        #[arg(long)]
        event: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cwd = match cli.cwd {
        Some(p) => p.canonicalize()?,
        None => std::env::current_dir()?,
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(dispatch(cli.command, cwd))
}

async fn dispatch(command: CliCommand, cwd: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        CliCommand::Run => run_daemon(cwd).await,
        CliCommand::Status { event } => send_command(&cwd, "status", event, None).await,
        CliCommand::ListChallenges => send_command(&cwd, "list_challenges", None, None).await,
        CliCommand::GetMetrics => send_command(&cwd, "get_metrics", None, None).await,
        CliCommand::GetLogs { limit } => {
            send_command(&cwd, "get_logs", None, Some(serde_json::json!({"limit": limit}))).await
        }
        CliCommand::GetScriptExecutions { limit, challenge_name } => {
            send_command(
                &cwd,
                "get_script_executions",
                None,
                Some(serde_json::json!({"limit": limit, "challenge_name": challenge_name})),
            )
            .await
        }
        CliCommand::StopScript { event, challenge_name, script_name } => {
            send_command(
                &cwd,
                "stop_script",
                Some(event),
                Some(serde_json::json!({"challenge_name": challenge_name, "script_name": script_name})),
            )
            .await
        }
        CliCommand::RestartChallenge { event, challenge_name } => {
            send_command(
                &cwd,
                "restart_challenge",
                Some(event),
                Some(serde_json::json!({"challenge_name": challenge_name})),
            )
            .await
        }
        CliCommand::StopEvent { event } => send_command(&cwd, "stop_event", Some(event), None).await,
    }
}

async fn run_daemon(cwd: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = WatcherConfig::from_dir(&cwd)?;
    write_pid_file(&config.pid_file)?;
    WATCHER_CONFIG.set(config);

    let _log_guard = logging::setup_logging();
    info!("gzwatcher starting");

    let db_path = WATCHER_CONFIG.get().db_path.clone();
    let socket_path = WATCHER_CONFIG.get().socket_path.clone();
    let store = Arc::new(PersistentStore::open(&db_path)?);

    let supervisor = Arc::new(Supervisor::new(store));
    supervisor.start_all(&WATCHER_CONFIG.get())?;

    let control_server = ControlServer::bind(&socket_path)?;
    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let server_supervisor = supervisor.clone();
    let server_task = tokio::spawn(async move { control_server.run(server_supervisor, server_cancel).await });

    tokio::signal::ctrl_c().await?;
    info!("received ctrl-c, shutting down");
    cancel.cancel();
    let _ = server_task.await;
    supervisor.shutdown().await;
    let _ = std::fs::remove_file(&WATCHER_CONFIG.get().pid_file);

    Ok(())
}

fn write_pid_file(path: &std::path::Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("{}\n", std::process::id()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

async fn send_command(
    cwd: &std::path::Path,
    action: &str,
    event: Option<String>,
    data: Option<serde_json::Value>,
) -> Result<(), Box<dyn std::error::Error>> {
    let socket_path = cwd.join(".gzcli/watcher/watcher.sock");
    let mut stream = UnixStream::connect(&socket_path).await?;

    let command = Command {
        action: action.to_string(),
        event,
        data,
    };
    let payload = serde_json::to_vec(&command)?;
    stream.write_all(&payload).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response: Response = serde_json::from_slice(&buf)?;

    if response.success {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        error!(error = ?response.error, "command failed");
        std::process::exit(1);
    }
    Ok(())
}
