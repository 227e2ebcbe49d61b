use std::path::Path;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::error::ShellError;

/// Runs `command` via `sh -c` in `cwd`, bounded by `timeout` and `cancel`. On timeout or
/// cancellation the child is killed and reaped before this returns, per spec.md 4.4's
/// cancellation semantics: no detachment, no orphans.
pub async fn run_with_timeout(
    command: &str,
    cwd: &Path,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<(), ShellError> {
    let mut child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|err| ShellError::LaunchFailed {
            command: command.to_string(),
            err,
        })?;

    let mut stderr = child.stderr.take();

    tokio::select! {
        status = child.wait() => {
            let status = status.map_err(|err| ShellError::LaunchFailed {
                command: command.to_string(),
                err,
            })?;
            if status.success() {
                Ok(())
            } else {
                let mut captured = String::new();
                if let Some(stderr) = stderr.as_mut() {
                    let _ = stderr.read_to_string(&mut captured).await;
                }
                Err(ShellError::NonZeroExit {
                    command: command.to_string(),
                    code: status.code(),
                    stderr: captured,
                })
            }
        }
        _ = tokio::time::sleep(timeout) => {
            kill_and_reap(&mut child).await;
            Err(ShellError::TimedOut {
                command: command.to_string(),
                timeout_secs: timeout.as_secs(),
            })
        }
        _ = cancel.cancelled() => {
            kill_and_reap(&mut child).await;
            Err(ShellError::Cancelled {
                command: command.to_string(),
            })
        }
    }
}

async fn kill_and_reap(child: &mut tokio::process::Child) {
    let _ = child.start_kill();
    let _ = child.wait().await;
}
