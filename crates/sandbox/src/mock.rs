//! In-memory container engine for testing without Docker.
//!
//! Understands just enough shell to be useful: `echo`, `sleep`, `exit` and
//! `true`/`false`. Anything else answers from the scripted response queue or
//! with a canned success. Failures can be injected per call type.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::bindings::VolumeBinding;
use crate::engine::{ContainerEngine, ContainerId, ExecResult};
use crate::error::{Result, SandboxError};
use crate::limits::ResourceLimits;

#[derive(Debug, Default)]
struct MockContainer {
    running: bool,
    read_only: Vec<PathBuf>,
    files: HashMap<PathBuf, Vec<u8>>,
}

/// Scriptable in-memory [`ContainerEngine`].
#[derive(Default)]
pub struct MockEngine {
    containers: Mutex<HashMap<String, MockContainer>>,
    exec_responses: Mutex<Vec<ExecResult>>,
    missing_images: Mutex<HashSet<String>>,
    unavailable: AtomicBool,
    fail_start: AtomicBool,
    exec_delay: Mutex<Option<Duration>>,
    create_delay: Mutex<Option<Duration>>,
    next_id: AtomicUsize,
    created: AtomicUsize,
    removed: AtomicUsize,
    in_flight: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue responses returned (in order) for commands the mock does not
    /// interpret itself.
    pub fn with_exec_responses(self, responses: Vec<ExecResult>) -> Self {
        *lock(&self.exec_responses) = responses;
        self
    }

    /// Pretend `image` does not exist anywhere.
    pub fn with_missing_image(self, image: &str) -> Self {
        lock(&self.missing_images).insert(image.to_string());
        self
    }

    /// Make every command take at least `delay` before completing.
    pub fn with_exec_delay(self, delay: Duration) -> Self {
        *lock(&self.exec_delay) = Some(delay);
        self
    }

    /// Make `create_container` take `delay` before the container appears.
    pub fn with_create_delay(self, delay: Duration) -> Self {
        *lock(&self.create_delay) = Some(delay);
        self
    }

    /// Simulate the daemon going away (or coming back).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `start_container` fail.
    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Number of containers currently known to the engine.
    pub fn container_count(&self) -> usize {
        lock(&self.containers).len()
    }

    /// Containers ever created.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Containers actually removed (idempotent no-ops excluded).
    pub fn removed_count(&self) -> usize {
        self.removed.load(Ordering::SeqCst)
    }

    /// Commands currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Whether a container is currently running.
    pub fn is_running(&self, id: &ContainerId) -> bool {
        lock(&self.containers)
            .get(id.as_str())
            .map(|c| c.running)
            .unwrap_or(false)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SandboxError::EngineUnavailable(
                "Cannot connect to the mock engine socket".to_string(),
            ));
        }
        Ok(())
    }

    fn require_running(&self, id: &ContainerId) -> Result<()> {
        match lock(&self.containers).get(id.as_str()) {
            Some(c) if c.running => Ok(()),
            Some(_) => Err(SandboxError::engine(format!(
                "Container {} is not running",
                id
            ))),
            None => Err(SandboxError::engine(format!("No such container: {}", id))),
        }
    }

    async fn interpret(&self, command: &str, timeout: Duration) -> Result<ExecResult> {
        let mut words = command.split_whitespace();
        let program = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();

        match program {
            "echo" => Ok(ExecResult {
                stdout: format!("{}\n", args.join(" ")),
                stderr: String::new(),
                exit_code: 0,
            }),
            "sleep" => {
                let secs: f64 = args
                    .first()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_default();
                let wanted = Duration::from_secs_f64(secs.max(0.0));
                if wanted > timeout {
                    tokio::time::sleep(timeout).await;
                    return Err(SandboxError::TimedOut(timeout));
                }
                tokio::time::sleep(wanted).await;
                Ok(ExecResult {
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: 0,
                })
            }
            "exit" => Ok(ExecResult {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: args.first().and_then(|s| s.parse().ok()).unwrap_or(0),
            }),
            "true" | "false" => Ok(ExecResult {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: i64::from(program == "false"),
            }),
            _ => {
                let mut responses = lock(&self.exec_responses);
                if responses.is_empty() {
                    Ok(ExecResult {
                        stdout: "[mock] command executed".to_string(),
                        stderr: String::new(),
                        exit_code: 0,
                    })
                } else {
                    Ok(responses.remove(0))
                }
            }
        }
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn create_container(
        &self,
        limits: &ResourceLimits,
        bindings: &[VolumeBinding],
    ) -> Result<ContainerId> {
        self.check_available()?;
        let delay = *lock(&self.create_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if lock(&self.missing_images).contains(&limits.image) {
            return Err(SandboxError::ImageNotFound {
                image: limits.image.clone(),
                message: format!("No such image: {}", limits.image),
            });
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("mock-container-{}-{}", n, uuid::Uuid::new_v4());
        let container = MockContainer {
            running: false,
            read_only: bindings
                .iter()
                .filter(|b| b.read_only)
                .map(|b| b.container_path.clone())
                .collect(),
            files: HashMap::new(),
        };
        lock(&self.containers).insert(id.clone(), container);
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(ContainerId(id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<()> {
        self.check_available()?;
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(SandboxError::StartFailed(
                "OCI runtime create failed: mock start failure".to_string(),
            ));
        }
        match lock(&self.containers).get_mut(id.as_str()) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => Err(SandboxError::StartFailed(format!("No such container: {}", id))),
        }
    }

    async fn exec(&self, id: &ContainerId, command: &str, timeout: Duration) -> Result<ExecResult> {
        self.check_available()?;
        self.require_running(id)?;

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.exec_delay);
        let result = async {
            if let Some(delay) = delay {
                if delay > timeout {
                    tokio::time::sleep(timeout).await;
                    return Err(SandboxError::TimedOut(timeout));
                }
                tokio::time::sleep(delay).await;
            }
            self.interpret(command, timeout).await
        }
        .await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn copy_to_container(
        &self,
        id: &ContainerId,
        content: &[u8],
        path: &Path,
    ) -> Result<()> {
        self.check_available()?;
        self.require_running(id)?;
        let mut containers = lock(&self.containers);
        let container = containers
            .get_mut(id.as_str())
            .ok_or_else(|| SandboxError::engine(format!("No such container: {}", id)))?;
        if container.read_only.iter().any(|ro| path.starts_with(ro)) {
            return Err(SandboxError::write_rejected(
                path.display().to_string(),
                "container rootfs is marked read-only",
            ));
        }
        container.files.insert(path.to_path_buf(), content.to_vec());
        Ok(())
    }

    async fn copy_from_container(&self, id: &ContainerId, path: &Path) -> Result<Vec<u8>> {
        self.check_available()?;
        self.require_running(id)?;
        lock(&self.containers)
            .get(id.as_str())
            .and_then(|c| c.files.get(path).cloned())
            .ok_or_else(|| SandboxError::PathNotFound(path.display().to_string()))
    }

    async fn remove_container(&self, id: &ContainerId, _force: bool) -> Result<()> {
        self.check_available()?;
        if lock(&self.containers).remove(id.as_str()).is_some() {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn container_exists(&self, id: &ContainerId) -> Result<bool> {
        self.check_available()?;
        Ok(lock(&self.containers).contains_key(id.as_str()))
    }

    async fn list_managed(&self) -> Result<Vec<ContainerId>> {
        self.check_available()?;
        Ok(lock(&self.containers)
            .keys()
            .map(|id| ContainerId(id.clone()))
            .collect())
    }

    async fn ping(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn running(engine: &MockEngine) -> ContainerId {
        let id = engine
            .create_container(&ResourceLimits::new("alpine"), &[])
            .await
            .unwrap();
        engine.start_container(&id).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_interprets_echo_and_exit() {
        let engine = MockEngine::new();
        let id = running(&engine).await;

        let out = engine.exec(&id, "echo 4", Duration::from_secs(5)).await.unwrap();
        assert_eq!(out.stdout, "4\n");
        assert_eq!(out.exit_code, 0);

        let out = engine.exec(&id, "exit 3", Duration::from_secs(5)).await.unwrap();
        assert_eq!(out.exit_code, 3);
    }

    #[tokio::test]
    async fn test_scripted_responses_in_order() {
        let engine = MockEngine::new().with_exec_responses(vec![ExecResult {
            stdout: "scripted".into(),
            stderr: String::new(),
            exit_code: 0,
        }]);
        let id = running(&engine).await;

        let out = engine.exec(&id, "python3 main.py", Duration::from_secs(5)).await.unwrap();
        assert_eq!(out.stdout, "scripted");
        let out = engine.exec(&id, "python3 main.py", Duration::from_secs(5)).await.unwrap();
        assert_eq!(out.stdout, "[mock] command executed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_past_timeout() {
        let engine = MockEngine::new();
        let id = running(&engine).await;
        let err = engine.exec(&id, "sleep 10", Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err, SandboxError::TimedOut(Duration::from_secs(1)));
        assert_eq!(engine.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_exec_requires_running_container() {
        let engine = MockEngine::new();
        let id = engine
            .create_container(&ResourceLimits::new("alpine"), &[])
            .await
            .unwrap();
        assert!(engine.exec(&id, "echo hi", Duration::from_secs(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let engine = MockEngine::new();
        let id = running(&engine).await;
        engine.remove_container(&id, true).await.unwrap();
        engine.remove_container(&id, true).await.unwrap();
        assert_eq!(engine.removed_count(), 1);
        assert!(!engine.container_exists(&id).await.unwrap());
    }
}
