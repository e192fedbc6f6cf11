//! Container engine adapter.
//!
//! `ContainerEngine` is the only point of contact with the container daemon.
//! Every call is side-effecting against external state and individually
//! non-transactional: a failure between `create_container` and
//! `start_container` leaves a stopped container behind, which
//! `remove_container` must be able to reap from its id alone.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::bindings::VolumeBinding;
use crate::error::Result;
use crate::limits::ResourceLimits;

/// Label stamped on every container cellbox creates.
pub const MANAGED_BY_LABEL: &str = "managed-by";
pub const MANAGED_BY_VALUE: &str = "cellbox";

// =============================================================================
// Engine Types
// =============================================================================

/// Engine-assigned container identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContainerId(pub String);

impl ContainerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of executing a command in a container.
///
/// All three fields are populated even on non-zero exit; a non-zero exit
/// code is a result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
}

impl ExecResult {
    /// Whether the command exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

// =============================================================================
// Container Engine Trait
// =============================================================================

/// Translation of sandbox operations into container-engine API calls.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Provision a stopped container with the given image, quotas, network
    /// mode and bind mounts.
    async fn create_container(
        &self,
        limits: &ResourceLimits,
        bindings: &[VolumeBinding],
    ) -> Result<ContainerId>;

    /// Transition a created container to running.
    async fn start_container(&self, id: &ContainerId) -> Result<()>;

    /// Run `command` through `sh -c` in the container's work dir.
    ///
    /// On timeout the in-container process group is killed and
    /// `SandboxError::TimedOut` is returned; the container keeps running.
    async fn exec(&self, id: &ContainerId, command: &str, timeout: Duration) -> Result<ExecResult>;

    /// Write `content` to the absolute container `path`, creating parents.
    async fn copy_to_container(&self, id: &ContainerId, content: &[u8], path: &Path)
        -> Result<()>;

    /// Read the regular file at the absolute container `path`.
    async fn copy_from_container(&self, id: &ContainerId, path: &Path) -> Result<Vec<u8>>;

    /// Stop (if running) and delete the container and its anonymous volumes.
    /// Removing an id that no longer exists is not an error.
    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<()>;

    /// Whether the engine still knows about this container.
    async fn container_exists(&self, id: &ContainerId) -> Result<bool>;

    /// Every container carrying the cellbox label, running or not.
    async fn list_managed(&self) -> Result<Vec<ContainerId>>;

    /// Check if the daemon is reachable.
    async fn ping(&self) -> bool;
}

/// Force-remove every labelled container the engine still holds.
///
/// Returns how many were removed; failures are logged and skipped.
pub async fn reap_orphans(engine: &dyn ContainerEngine) -> Result<usize> {
    let mut removed = 0;
    for id in engine.list_managed().await? {
        match engine.remove_container(&id, true).await {
            Ok(()) => {
                tracing::info!(container_id = %id, "Reaped orphaned sandbox container");
                removed += 1;
            }
            Err(e) => {
                tracing::warn!(container_id = %id, error = %e, "Failed to reap sandbox container");
            }
        }
    }
    Ok(removed)
}
