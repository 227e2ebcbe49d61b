use std::path::Path;

use crate::error::{ShellError, VcsError};

/// Invokes `git pull` in `cwd`, returning its combined stdout+stderr output.
pub async fn pull(cwd: &Path) -> Result<String, VcsError> {
    if !cwd.join(".git").is_dir() {
        return Err(VcsError::NotARepo {
            path: cwd.to_path_buf(),
        });
    }
    run_git(cwd, &["pull"]).await
}

/// Reads the current HEAD commit SHA for the repository rooted at `cwd`.
pub async fn head_sha(cwd: &Path) -> Result<String, VcsError> {
    let output = run_git(cwd, &["rev-parse", "HEAD"]).await?;
    Ok(output.trim().to_string())
}

async fn run_git(cwd: &Path, args: &[&str]) -> Result<String, VcsError> {
    let output = tokio::process::Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .await
        .map_err(|err| {
            VcsError::Shell(ShellError::LaunchFailed {
                command: format!("git {}", args.join(" ")),
                err,
            })
        })?;

    if !output.status.success() {
        return Err(VcsError::Shell(ShellError::NonZeroExit {
            command: format!("git {}", args.join(" ")),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }));
    }

    let mut combined = String::from_utf8(output.stdout).map_err(|_| VcsError::InvalidOutput)?;
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(combined)
}
