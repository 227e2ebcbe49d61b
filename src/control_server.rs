use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::ControlError;
use crate::protocol::{Command, Response};
use crate::supervisor::Supervisor;

const CONNECTION_DEADLINE: Duration = Duration::from_secs(30);

/// Unix-domain socket listener serving the JSON control protocol (spec.md 4.9). One coroutine per
/// accepted connection; each handles exactly one request/response round trip before closing.
pub struct ControlServer {
    listener: UnixListener,
    socket_path: PathBuf,
}
impl ControlServer {
    pub fn bind(socket_path: &Path) -> Result<Self, ControlError> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| ControlError::ParentDirFailed {
                path: parent.to_path_buf(),
                err,
            })?;
            set_dir_permissions(parent);
        }
        if socket_path.exists() {
            std::fs::remove_file(socket_path).map_err(|err| ControlError::StaleSocketRemovalFailed {
                path: socket_path.to_path_buf(),
                err,
            })?;
        }

        let listener = UnixListener::bind(socket_path).map_err(|err| ControlError::BindFailed {
            path: socket_path.to_path_buf(),
            err,
        })?;
        set_permissions(socket_path);

        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
        })
    }

    /// Runs the accept loop until `cancel` fires, then removes the socket file.
    pub async fn run(self, supervisor: Arc<Supervisor>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let supervisor = supervisor.clone();
                            tokio::spawn(async move {
                                if let Err(err) = handle_connection(stream, supervisor).await {
                                    error!(error = %err, "control connection error");
                                }
                            });
                        }
                        Err(err) => error!(error = %err, "failed to accept control connection"),
                    }
                }
            }
        }
        let _ = std::fs::remove_file(&self.socket_path);
        info!("control server stopped");
    }
}

async fn handle_connection(mut stream: UnixStream, supervisor: Arc<Supervisor>) -> std::io::Result<()> {
    let request = tokio::time::timeout(CONNECTION_DEADLINE, read_command(&mut stream)).await;

    let response = match request {
        Ok(Ok(command)) => supervisor.handle_command(command).await,
        Ok(Err(err)) => Response::err(format!("invalid request: {err}")),
        Err(_) => Response::err("connection timed out waiting for request"),
    };

    let payload = serde_json::to_vec(&response).unwrap_or_else(|_| b"{}".to_vec());
    tokio::time::timeout(CONNECTION_DEADLINE, async {
        stream.write_all(&payload).await?;
        stream.flush().await
    })
    .await
    .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "write deadline exceeded"))??;

    Ok(())
}

async fn read_command(stream: &mut UnixStream) -> Result<Command, serde_json::Error> {
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf).await;
    serde_json::from_slice(&buf)
}

#[cfg(unix)]
fn set_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666));
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path) {}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o750));
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) {}
