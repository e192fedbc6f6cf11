//! Caller-facing façade over at most one [`Sandbox`].
//!
//! Pass a `SandboxClient` (usually behind an `Arc`) to whoever needs a
//! sandbox; nothing here is process-global, so several clients can coexist.

use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use cellbox_core::events::{
    EventEnvelope, EventSeverity, EventType, FsPayload, LifecyclePayload, ToolExecPayload,
};
use cellbox_core::traits::EventEmitter;

use crate::bindings::{VolumeBinding, VolumeBindingResolver};
use crate::engine::{ContainerEngine, ContainerId, ExecResult};
use crate::error::{Result, SandboxError};
use crate::limits::ResourceLimits;
use crate::sandbox::{Sandbox, SandboxState};

const ACTOR: &str = "sandbox-client";

/// Owns zero or one sandbox and serializes its lifecycle.
pub struct SandboxClient {
    engine: Arc<dyn ContainerEngine>,
    active: RwLock<Option<Arc<Sandbox>>>,
    event_emitter: Option<Arc<dyn EventEmitter>>,
}

impl SandboxClient {
    /// Create a client with no sandbox.
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            engine,
            active: RwLock::new(None),
            event_emitter: None,
        }
    }

    /// Set an event emitter for auditing sandbox operations.
    pub fn with_event_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.event_emitter = Some(emitter);
        self
    }

    /// Check if the container engine is reachable.
    pub async fn is_available(&self) -> bool {
        self.engine.ping().await
    }

    /// Validate the request and bring up a new sandbox.
    ///
    /// Fails with `AlreadyActive` while a previous sandbox is owned. Any
    /// failure after validation triggers `cleanup` on the half-built sandbox
    /// before the error is returned.
    pub async fn create(&self, limits: ResourceLimits, bindings: Vec<VolumeBinding>) -> Result<()> {
        let mut active = self.active.write().await;
        if let Some(existing) = active.as_ref() {
            if existing.state().await != SandboxState::Destroyed {
                return Err(SandboxError::AlreadyActive);
            }
        }

        limits.validate()?;
        let work_dir = limits.work_dir.clone();
        let resolved = tokio::task::spawn_blocking(move || {
            VolumeBindingResolver::resolve(&bindings, &work_dir)
        })
        .await
        .map_err(|e| SandboxError::engine(format!("Binding resolution task failed: {}", e)))??;

        let image = limits.image.clone();
        let sandbox = Arc::new(Sandbox::new(self.engine.clone(), Arc::new(limits), resolved));

        match sandbox.create().await {
            Ok(()) => {
                let container_id = sandbox.container_id().await;
                self.emit_lifecycle(EventType::SandboxCreated, container_id, &image, None)
                    .await;
                *active = Some(sandbox);
                Ok(())
            }
            Err(e) => {
                let container_id = sandbox.container_id().await;
                sandbox.cleanup().await;
                self.emit_lifecycle(
                    EventType::SystemError,
                    container_id,
                    &image,
                    Some(e.to_string()),
                )
                .await;
                Err(e)
            }
        }
    }

    /// Whether a sandbox is owned and running.
    pub async fn is_ready(&self) -> bool {
        match self.current().await {
            Ok(sandbox) => sandbox.state().await == SandboxState::Running,
            Err(_) => false,
        }
    }

    /// State of the owned sandbox, if any.
    pub async fn state(&self) -> Option<SandboxState> {
        match self.current().await {
            Ok(sandbox) => Some(sandbox.state().await),
            Err(_) => None,
        }
    }

    /// Container backing the owned sandbox, if any.
    pub async fn container_id(&self) -> Option<ContainerId> {
        match self.current().await {
            Ok(sandbox) => sandbox.container_id().await,
            Err(_) => None,
        }
    }

    /// Limits of the owned sandbox, if any.
    pub async fn limits(&self) -> Option<ResourceLimits> {
        self.current().await.ok().map(|s| s.limits().clone())
    }

    /// Run a command in the owned sandbox.
    pub async fn run_command(&self, command: &str, timeout: Duration) -> Result<ExecResult> {
        let sandbox = self.current().await?;
        let started = Instant::now();
        let result = sandbox.run_command(command, timeout).await;

        if self.event_emitter.is_some() {
            let payload = ToolExecPayload {
                command: command.to_string(),
                exit_code: result.as_ref().ok().map(|r| r.exit_code),
                duration_ms: started.elapsed().as_millis() as u64,
                timed_out: matches!(result, Err(SandboxError::TimedOut(_))),
                error: result.as_ref().err().map(|e| e.to_string()),
            };
            self.emit(&sandbox, EventType::ToolExecFinished, json!(payload), result.is_ok())
                .await;
        }

        result
    }

    /// Read a file from the owned sandbox.
    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let sandbox = self.current().await?;
        let result = sandbox.read_file(path).await;

        if self.event_emitter.is_some() {
            let payload = FsPayload {
                path: path.to_string(),
                operation: "read".to_string(),
                size_bytes: result.as_ref().ok().map(|c| c.len() as u64),
                success: result.is_ok(),
                error: result.as_ref().err().map(|e| e.to_string()),
            };
            self.emit(&sandbox, EventType::FsRead, json!(payload), result.is_ok())
                .await;
        }

        result
    }

    /// Write a file into the owned sandbox.
    pub async fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        let sandbox = self.current().await?;
        let result = sandbox.write_file(path, content).await;

        if self.event_emitter.is_some() {
            let payload = FsPayload {
                path: path.to_string(),
                operation: "write".to_string(),
                size_bytes: Some(content.len() as u64),
                success: result.is_ok(),
                error: result.as_ref().err().map(|e| e.to_string()),
            };
            self.emit(&sandbox, EventType::FsWrite, json!(payload), result.is_ok())
                .await;
        }

        result
    }

    /// Tear down the owned sandbox (if any) and release it.
    ///
    /// Never fails; calling it with nothing owned is a no-op.
    pub async fn cleanup(&self) {
        let mut active = self.active.write().await;
        if let Some(sandbox) = active.take() {
            let container_id = sandbox.container_id().await;
            let image = sandbox.limits().image.clone();
            sandbox.cleanup().await;
            self.emit_lifecycle(EventType::SandboxDestroyed, container_id, &image, None)
                .await;
        }
    }

    async fn current(&self) -> Result<Arc<Sandbox>> {
        self.active
            .read()
            .await
            .clone()
            .ok_or(SandboxError::NotInitialized)
    }

    async fn emit(
        &self,
        sandbox: &Sandbox,
        event_type: EventType,
        payload: serde_json::Value,
        success: bool,
    ) {
        if let Some(ref emitter) = self.event_emitter {
            let mut event = EventEnvelope::new(event_type, payload).with_actor(ACTOR);
            if let Some(id) = sandbox.container_id().await {
                event = event.with_sandbox(id.as_str());
            }
            if !success {
                event = event.with_severity(EventSeverity::Warning);
            }
            emitter.emit(event).await;
        }
    }

    async fn emit_lifecycle(
        &self,
        event_type: EventType,
        container_id: Option<ContainerId>,
        image: &str,
        error: Option<String>,
    ) {
        if let Some(ref emitter) = self.event_emitter {
            let severity = if error.is_some() {
                EventSeverity::Error
            } else {
                EventSeverity::Info
            };
            let payload = LifecyclePayload {
                container_id: container_id.as_ref().map(|id| id.to_string()),
                image: image.to_string(),
                error,
            };
            let mut event = EventEnvelope::new(event_type, json!(payload))
                .with_actor(ACTOR)
                .with_severity(severity);
            if let Some(id) = container_id {
                event = event.with_sandbox(id.as_str());
            }
            emitter.emit(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEngine;
    use cellbox_core::traits::RecordingEventEmitter;

    fn limits() -> ResourceLimits {
        ResourceLimits::new("alpine:3.20")
    }

    #[tokio::test]
    async fn test_not_initialized_passthrough() {
        let client = SandboxClient::new(Arc::new(MockEngine::new()));
        assert!(!client.is_ready().await);
        assert_eq!(
            client.run_command("echo 4", Duration::from_secs(1)).await,
            Err(SandboxError::NotInitialized)
        );
        assert_eq!(client.read_file("a").await, Err(SandboxError::NotInitialized));
        assert_eq!(
            client.write_file("a", b"").await,
            Err(SandboxError::NotInitialized)
        );
        client.cleanup().await;
    }

    #[tokio::test]
    async fn test_single_sandbox_discipline() {
        let engine = Arc::new(MockEngine::new());
        let client = SandboxClient::new(engine.clone());

        client.create(limits(), Vec::new()).await.unwrap();
        assert!(client.is_ready().await);
        assert_eq!(
            client.create(limits(), Vec::new()).await,
            Err(SandboxError::AlreadyActive)
        );
        assert_eq!(engine.created_count(), 1);

        client.cleanup().await;
        assert!(!client.is_ready().await);
        assert_eq!(client.state().await, None);

        client.create(limits(), Vec::new()).await.unwrap();
        assert_eq!(engine.created_count(), 2);
        assert_eq!(engine.container_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_create_leaks_nothing() {
        let engine = Arc::new(MockEngine::new());
        engine.set_fail_start(true);
        let client = SandboxClient::new(engine.clone());

        let err = client.create(limits(), Vec::new()).await.unwrap_err();
        assert!(matches!(err, SandboxError::StartFailed(_)));
        assert_eq!(engine.created_count(), 1);
        assert_eq!(engine.container_count(), 0);
        assert!(!client.is_ready().await);

        engine.set_fail_start(false);
        client.create(limits(), Vec::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_input_never_reaches_engine() {
        let engine = Arc::new(MockEngine::new());
        let client = SandboxClient::new(engine.clone());

        let err = client
            .create(limits(), vec![VolumeBinding::new("/no/such/cellbox/dir", "/data")])
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::InvalidBinding(_)));

        let err = client
            .create(limits().with_cpu_share(2.0), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::InvalidLimits(_)));
        assert_eq!(engine.created_count(), 0);
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let emitter = Arc::new(RecordingEventEmitter::new());
        let client = SandboxClient::new(Arc::new(MockEngine::new()))
            .with_event_emitter(emitter.clone());

        client.create(limits(), Vec::new()).await.unwrap();
        client.write_file("a.txt", b"hi").await.unwrap();
        client.read_file("a.txt").await.unwrap();
        client.run_command("echo hi", Duration::from_secs(1)).await.unwrap();
        client.cleanup().await;

        assert_eq!(
            emitter.event_types(),
            vec![
                EventType::SandboxCreated,
                EventType::FsWrite,
                EventType::FsRead,
                EventType::ToolExecFinished,
                EventType::SandboxDestroyed,
            ]
        );
        assert!(emitter.events().iter().all(|e| e.sandbox_id.is_some()));
    }
}
