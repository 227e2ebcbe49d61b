use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use crate::classifier::UpdateType;
use crate::error::UpdateError;

/// The business logic that reacts to a classified challenge change (remote API sync, attachment
/// upload, full redeploy). Opaque to the coalescer, which only logs and records what this returns
/// (spec.md §6's `UpdateExecutor` collaborator).
#[async_trait]
pub trait UpdateExecutor: Send + Sync {
    async fn apply(
        &self,
        challenge_name: &str,
        changed_path: &Path,
        update_type: UpdateType,
    ) -> Result<(), UpdateError>;
}

/// The default executor: logs the update it would have performed and returns success. Real
/// deployments supply their own `UpdateExecutor` wired to the CTF platform's API client, which is
/// out of this core's scope.
pub struct LoggingUpdateExecutor;
#[async_trait]
impl UpdateExecutor for LoggingUpdateExecutor {
    async fn apply(
        &self,
        challenge_name: &str,
        changed_path: &Path,
        update_type: UpdateType,
    ) -> Result<(), UpdateError> {
        info!(
            challenge = %challenge_name,
            path = %changed_path.display(),
            update_type = ?update_type,
            "would apply update"
        );
        Ok(())
    }
}
