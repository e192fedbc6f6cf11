//! A single sandbox backed by exactly one container.
//!
//! ```text
//! Uncreated --create()--> Creating --ok--> Running
//! Creating  --engine failure--> Error
//! Running   --run_command/read_file/write_file--> Running
//! Running   --cleanup()--> Stopped --> Destroyed
//! any       --cleanup()--> Destroyed
//! ```
//!
//! Locking: `lifecycle` serializes `create` and `cleanup`. `status` is a
//! read/write gate: operations hold a read guard for their whole engine call,
//! so `cleanup` (which takes the write guard) waits for in-flight commands
//! before the container is removed, and no operation starts mid-teardown.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use cellbox_core::fs_policy::resolve_container_path;

use crate::bindings::{MountTable, VolumeBinding};
use crate::engine::{ContainerEngine, ContainerId, ExecResult};
use crate::error::{Result, SandboxError};
use crate::limits::ResourceLimits;

/// Lifecycle state of a [`Sandbox`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    Uncreated,
    Creating,
    Running,
    Stopped,
    Destroyed,
    Error,
}

#[derive(Debug)]
struct Status {
    state: SandboxState,
    container_id: Option<ContainerId>,
}

/// One isolated execution environment.
///
/// Mutated only through its own methods. `create` may succeed at most once
/// per instance; `cleanup` is idempotent and never fails observably.
pub struct Sandbox {
    engine: Arc<dyn ContainerEngine>,
    limits: Arc<ResourceLimits>,
    bindings: Arc<[VolumeBinding]>,
    mounts: MountTable,
    lifecycle: Mutex<()>,
    status: RwLock<Status>,
}

impl Sandbox {
    /// Build an uncreated sandbox. `bindings` should already be resolved.
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        limits: Arc<ResourceLimits>,
        bindings: Vec<VolumeBinding>,
    ) -> Self {
        let mounts = MountTable::new(&limits.work_dir, &bindings);
        Self {
            engine,
            limits,
            bindings: bindings.into(),
            mounts,
            lifecycle: Mutex::new(()),
            status: RwLock::new(Status {
                state: SandboxState::Uncreated,
                container_id: None,
            }),
        }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    pub fn bindings(&self) -> &[VolumeBinding] {
        &self.bindings
    }

    pub async fn state(&self) -> SandboxState {
        self.status.read().await.state
    }

    /// Engine-assigned id, once `create_container` has succeeded.
    pub async fn container_id(&self) -> Option<ContainerId> {
        self.status.read().await.container_id.clone()
    }

    /// Provision and start the container.
    ///
    /// Fails with `AlreadyCreated` on any instance that has left `Uncreated`.
    /// On engine failure the state becomes `Error`; any container that was
    /// created stays recorded so `cleanup` can reap it.
    pub async fn create(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        {
            let mut status = self.status.write().await;
            if status.state != SandboxState::Uncreated {
                return Err(SandboxError::AlreadyCreated);
            }
            status.state = SandboxState::Creating;
        }

        tracing::debug!(image = %self.limits.image, bindings = self.bindings.len(), "Creating sandbox");

        let id = match self
            .engine
            .create_container(&self.limits, &self.bindings)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                self.status.write().await.state = SandboxState::Error;
                tracing::warn!(image = %self.limits.image, error = %e, "Sandbox container creation failed");
                return Err(e);
            }
        };
        self.status.write().await.container_id = Some(id.clone());

        if let Err(e) = self.engine.start_container(&id).await {
            self.status.write().await.state = SandboxState::Error;
            tracing::warn!(container_id = %id, error = %e, "Sandbox container failed to start");
            return Err(e);
        }

        self.status.write().await.state = SandboxState::Running;
        tracing::info!(container_id = %id, image = %self.limits.image, "Sandbox running");
        Ok(())
    }

    /// Run `command` through the container shell.
    ///
    /// Exit codes are returned, not judged. On `TimedOut` the offending
    /// process is killed and the sandbox stays `Running`.
    pub async fn run_command(&self, command: &str, timeout: Duration) -> Result<ExecResult> {
        let status = self.status.read().await;
        let id = running_id(&status)?;

        tracing::debug!(container_id = %id, command = %command, timeout_ms = timeout.as_millis() as u64, "Running sandbox command");
        self.engine.exec(id, command, timeout).await
    }

    /// Read a file; relative paths resolve against the work dir.
    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let status = self.status.read().await;
        let id = running_id(&status)?;
        let target = self.resolve_path(path)?;

        self.engine.copy_from_container(id, &target).await
    }

    /// Write a file; relative paths resolve against the work dir.
    pub async fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        let status = self.status.read().await;
        let id = running_id(&status)?;
        let target = self.resolve_path(path)?;

        self.engine.copy_to_container(id, content, &target).await
    }

    /// Resolve `path` and require it to land in a writable mount.
    ///
    /// Applies to reads too: host-mounted read-only regions and the image's
    /// own filesystem are off limits for file transfer.
    pub fn resolve_path(&self, path: &str) -> Result<PathBuf> {
        let resolved = resolve_container_path(&self.limits.work_dir, path)
            .map_err(|_| SandboxError::PathEscape(path.to_string()))?;
        if !self.mounts.is_writable(&resolved) {
            return Err(SandboxError::PathEscape(path.to_string()));
        }
        Ok(resolved)
    }

    /// Remove the container, whatever state the sandbox is in.
    ///
    /// Waits for in-flight operations, then always ends in `Destroyed`.
    /// Engine failures are logged and swallowed; "already gone" is success.
    pub async fn cleanup(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let mut status = self.status.write().await;

        if status.state == SandboxState::Destroyed {
            return;
        }
        if status.state == SandboxState::Running {
            status.state = SandboxState::Stopped;
        }

        if let Some(id) = status.container_id.take() {
            match self.engine.remove_container(&id, true).await {
                Ok(()) => tracing::info!(container_id = %id, "Sandbox destroyed"),
                Err(e) => {
                    tracing::warn!(container_id = %id, error = %e, "Failed to remove sandbox container; ignoring")
                }
            }
        }

        status.state = SandboxState::Destroyed;
    }
}

fn running_id(status: &Status) -> Result<&ContainerId> {
    match (&status.state, &status.container_id) {
        (SandboxState::Running, Some(id)) => Ok(id),
        _ => Err(SandboxError::NotInitialized),
    }
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("limits", &self.limits)
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEngine;

    fn sandbox_with(engine: Arc<MockEngine>) -> Sandbox {
        Sandbox::new(engine, Arc::new(ResourceLimits::new("alpine:3.20")), Vec::new())
    }

    #[tokio::test]
    async fn test_create_then_cleanup_leaves_nothing() {
        let engine = Arc::new(MockEngine::new());
        let sandbox = sandbox_with(engine.clone());

        sandbox.create().await.unwrap();
        assert_eq!(sandbox.state().await, SandboxState::Running);
        let id = sandbox.container_id().await.unwrap();

        sandbox.cleanup().await;
        assert_eq!(sandbox.state().await, SandboxState::Destroyed);
        assert!(!engine.container_exists(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_second_create_is_rejected() {
        let engine = Arc::new(MockEngine::new());
        let sandbox = sandbox_with(engine.clone());

        sandbox.create().await.unwrap();
        let id = sandbox.container_id().await.unwrap();

        assert_eq!(sandbox.create().await, Err(SandboxError::AlreadyCreated));
        assert_eq!(sandbox.state().await, SandboxState::Running);
        assert!(engine.is_running(&id));
        assert_eq!(engine.created_count(), 1);
    }

    #[tokio::test]
    async fn test_operations_before_create_are_not_initialized() {
        let sandbox = sandbox_with(Arc::new(MockEngine::new()));
        for command in ["echo 4", "", "rm -rf /"] {
            assert_eq!(
                sandbox.run_command(command, Duration::from_secs(1)).await,
                Err(SandboxError::NotInitialized)
            );
        }
        assert_eq!(
            sandbox.read_file("a.txt").await,
            Err(SandboxError::NotInitialized)
        );
        assert_eq!(
            sandbox.write_file("a.txt", b"x").await,
            Err(SandboxError::NotInitialized)
        );
    }

    #[tokio::test]
    async fn test_start_failure_is_error_and_reapable() {
        let engine = Arc::new(MockEngine::new());
        engine.set_fail_start(true);
        let sandbox = sandbox_with(engine.clone());

        let err = sandbox.create().await.unwrap_err();
        assert!(matches!(err, SandboxError::StartFailed(_)));
        assert_eq!(sandbox.state().await, SandboxState::Error);
        assert_eq!(engine.container_count(), 1);

        sandbox.cleanup().await;
        assert_eq!(sandbox.state().await, SandboxState::Destroyed);
        assert_eq!(engine.container_count(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_never_created_and_twice() {
        let engine = Arc::new(MockEngine::new());
        let sandbox = sandbox_with(engine.clone());

        sandbox.cleanup().await;
        sandbox.cleanup().await;
        assert_eq!(sandbox.state().await, SandboxState::Destroyed);
        assert_eq!(engine.removed_count(), 0);
        assert_eq!(sandbox.create().await, Err(SandboxError::AlreadyCreated));
    }

    #[tokio::test]
    async fn test_cleanup_swallows_engine_failure() {
        let engine = Arc::new(MockEngine::new());
        let sandbox = sandbox_with(engine.clone());
        sandbox.create().await.unwrap();

        engine.set_unavailable(true);
        sandbox.cleanup().await;
        assert_eq!(sandbox.state().await, SandboxState::Destroyed);
    }

    #[tokio::test]
    async fn test_path_escape() {
        let sandbox = sandbox_with(Arc::new(MockEngine::new()));
        sandbox.create().await.unwrap();

        for path in ["../../etc/passwd", "../etc/passwd", "/etc/passwd", "/tmp/x"] {
            assert_eq!(
                sandbox.read_file(path).await,
                Err(SandboxError::PathEscape(path.to_string())),
                "{path}"
            );
        }
        assert_eq!(
            sandbox.resolve_path("src/../main.py").unwrap(),
            PathBuf::from("/workspace/main.py")
        );
        assert_eq!(
            sandbox.resolve_path("/workspace/a.txt").unwrap(),
            PathBuf::from("/workspace/a.txt")
        );
    }

    #[tokio::test]
    async fn test_read_only_binding_is_outside_writable_set() {
        let engine = Arc::new(MockEngine::new());
        let sandbox = Sandbox::new(
            engine,
            Arc::new(ResourceLimits::new("alpine")),
            vec![
                VolumeBinding::new("/srv/ref", "/workspace/ref").read_only(),
                VolumeBinding::new("/srv/out", "/out"),
            ],
        );
        sandbox.create().await.unwrap();

        assert!(matches!(
            sandbox.write_file("ref/notes.md", b"x").await,
            Err(SandboxError::PathEscape(_))
        ));
        sandbox.write_file("/out/result.json", b"{}").await.unwrap();
        assert_eq!(sandbox.read_file("/out/result.json").await.unwrap(), b"{}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_sandbox_running() {
        let sandbox = sandbox_with(Arc::new(MockEngine::new()));
        sandbox.create().await.unwrap();

        let err = sandbox
            .run_command("sleep 60", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err, SandboxError::TimedOut(Duration::from_secs(2)));
        assert_eq!(sandbox.state().await, SandboxState::Running);

        let ok = sandbox
            .run_command("echo ok", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(ok.exit_code, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_during_create_runs_after_it() {
        let engine = Arc::new(MockEngine::new().with_create_delay(Duration::from_millis(200)));
        let sandbox = sandbox_with(engine.clone());

        // `create` is polled first and holds the lifecycle lock while the
        // engine is slow; `cleanup` queues behind it.
        let (created, state_seen, ()) = tokio::join!(
            sandbox.create(),
            async {
                tokio::task::yield_now().await;
                sandbox.state().await
            },
            sandbox.cleanup(),
        );

        assert_eq!(created, Ok(()));
        assert_eq!(state_seen, SandboxState::Creating);
        assert_eq!(sandbox.state().await, SandboxState::Destroyed);
        assert_eq!(engine.created_count(), 1);
        assert_eq!(engine.removed_count(), 1);
        assert_eq!(engine.container_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_after_concurrent_cleanup_is_rejected() {
        let engine = Arc::new(MockEngine::new().with_create_delay(Duration::from_millis(200)));
        let sandbox = sandbox_with(engine.clone());

        let ((), created) = tokio::join!(sandbox.cleanup(), sandbox.create());

        assert_eq!(created, Err(SandboxError::AlreadyCreated));
        assert_eq!(sandbox.state().await, SandboxState::Destroyed);
        assert_eq!(engine.created_count(), 0);
        assert_eq!(engine.container_count(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_waits_for_in_flight_command() {
        let engine = Arc::new(MockEngine::new().with_exec_delay(Duration::from_millis(200)));
        let sandbox = Arc::new(sandbox_with(engine.clone()));
        sandbox.create().await.unwrap();

        let runner = {
            let sandbox = sandbox.clone();
            tokio::spawn(async move { sandbox.run_command("echo slow", Duration::from_secs(5)).await })
        };
        // Let the command reach the engine.
        while engine.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        sandbox.cleanup().await;
        let output = runner.await.unwrap().unwrap();
        assert_eq!(output.stdout, "slow\n");
        assert_eq!(engine.container_count(), 0);
    }
}
