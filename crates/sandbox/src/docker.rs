//! Docker-backed [`ContainerEngine`] using the `bollard` crate.
//!
//! Containers are created with:
//! - `none` or `bridge` networking
//! - Read-only root filesystem (writable work dir volume and `/tmp` only)
//! - Memory, CFS quota and pids limits
//! - All capabilities dropped, no privilege escalation
//!
//! bollard is fully async; only tar packing/unpacking is pushed onto the
//! blocking pool.

use async_trait::async_trait;
use bollard::errors::Error as BollardError;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use crate::bindings::{is_bound, VolumeBinding};
use crate::engine::{ContainerEngine, ContainerId, ExecResult, MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use crate::error::{Result, SandboxError};
use crate::limits::ResourceLimits;

const TMP_MOUNT_OPTIONS: &str = "rw,nosuid,nodev,size=64m";
const STOP_GRACE_SECS: i64 = 5;
const KILL_TIMEOUT: Duration = Duration::from_secs(5);
const MKDIR_TIMEOUT: Duration = Duration::from_secs(10);

/// Docker-based container engine.
pub struct DockerEngine {
    docker: bollard::Docker,
}

impl DockerEngine {
    /// Connect to the local Docker daemon (socket or `DOCKER_HOST`).
    pub fn new() -> Result<Self> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            SandboxError::EngineUnavailable(format!(
                "Failed to connect to Docker daemon: {}. Is Docker running?",
                e
            ))
        })?;
        Ok(Self { docker })
    }

    /// Create from an existing bollard Docker client.
    pub fn from_client(docker: bollard::Docker) -> Self {
        Self { docker }
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        use bollard::image::CreateImageOptions;

        tracing::info!(image = %image, "Pulling missing sandbox image");
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };
        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(step) = progress.next().await {
            if let Err(e) = step {
                return Err(match classify(e) {
                    EngineFailure::Unavailable(msg) => SandboxError::EngineUnavailable(msg),
                    EngineFailure::Status { message, .. } | EngineFailure::Other(message) => {
                        SandboxError::ImageNotFound {
                            image: image.to_string(),
                            message,
                        }
                    }
                });
            }
        }
        Ok(())
    }

    async fn create_once(
        &self,
        limits: &ResourceLimits,
        bindings: &[VolumeBinding],
    ) -> std::result::Result<ContainerId, BollardError> {
        use bollard::container::{Config, CreateContainerOptions};
        use bollard::models::{HostConfig, Mount, MountTypeEnum, ResourcesUlimits};

        let name = format!("cellbox-{}", uuid::Uuid::new_v4());
        let work_dir = limits.work_dir.to_string_lossy().to_string();
        let (cpu_quota, cpu_period) = limits.cpu_quota();

        let mut mounts: Vec<Mount> = bindings
            .iter()
            .map(|b| Mount {
                source: Some(b.host_path.to_string_lossy().to_string()),
                target: Some(b.container_path.to_string_lossy().to_string()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(b.read_only),
                ..Default::default()
            })
            .collect();
        if !is_bound(bindings, &limits.work_dir) {
            // Anonymous volume, not tmpfs: the archive endpoints used for file
            // transfer only see volumes and bind mounts. Removed with `v: true`.
            mounts.push(Mount {
                target: Some(work_dir.clone()),
                typ: Some(MountTypeEnum::VOLUME),
                ..Default::default()
            });
        }

        let host_config = HostConfig {
            memory: Some(limits.memory_bytes_i64()),
            // Equal to memory: no swap on top of the limit
            memory_swap: Some(limits.memory_bytes_i64()),
            cpu_quota: Some(cpu_quota),
            cpu_period: Some(cpu_period),
            network_mode: Some(limits.network_mode().to_string()),
            mounts: Some(mounts),
            tmpfs: Some(HashMap::from([(
                "/tmp".to_string(),
                TMP_MOUNT_OPTIONS.to_string(),
            )])),
            readonly_rootfs: Some(true),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges:true".to_string()]),
            pids_limit: Some(limits.pids_limit),
            ulimits: Some(vec![ResourcesUlimits {
                name: Some("nofile".to_string()),
                soft: Some(1024),
                hard: Some(2048),
            }]),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(limits.image.clone()),
            working_dir: Some(work_dir),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            network_disabled: Some(!limits.network_enabled),
            host_config: Some(host_config),
            labels: Some(HashMap::from([(
                MANAGED_BY_LABEL.to_string(),
                MANAGED_BY_VALUE.to_string(),
            )])),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: name.as_str(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), container_config)
            .await?;
        for warning in &response.warnings {
            tracing::warn!(container_id = %response.id, warning = %warning, "Docker warning on create");
        }
        Ok(ContainerId(response.id))
    }

    /// Run a command and collect its output without any timeout handling.
    async fn run_exec(&self, id: &ContainerId, cmd: Vec<String>) -> Result<(String, String, String)> {
        use bollard::container::LogOutput;
        use bollard::exec::{CreateExecOptions, StartExecResults};

        let exec_options = CreateExecOptions {
            cmd: Some(cmd),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(id.as_str(), exec_options)
            .await
            .map_err(|e| engine_error("Failed to create exec in sandbox", e))?;

        let start_result = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| engine_error("Failed to start exec in sandbox", e))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = start_result {
            while let Some(msg) = output.next().await {
                match msg {
                    Ok(LogOutput::StdOut { message }) => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(_) => {} // ignore stdin/console echoes
                    Err(e) => {
                        stderr.push_str(&format!("\n[sandbox stream error: {}]", e));
                        break;
                    }
                }
            }
        }

        Ok((exec.id, stdout, stderr))
    }

    async fn exit_code(&self, id: &ContainerId, exec_id: &str) -> Result<i64> {
        // The attach stream can close a moment before the daemon records the code.
        for _ in 0..10 {
            let inspect = self
                .docker
                .inspect_exec(exec_id)
                .await
                .map_err(|e| engine_error("Failed to inspect exec result", e))?;
            if inspect.running != Some(true) {
                return Ok(inspect.exit_code.unwrap_or(-1));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Ok(unsettled_exit_code(id, exec_id))
    }

    async fn kill_exec(&self, id: &ContainerId, pid_file: &str) {
        let script = kill_script(pid_file);
        let cmd = vec!["sh".to_string(), "-c".to_string(), script];
        match tokio::time::timeout(KILL_TIMEOUT, self.run_exec(id, cmd)).await {
            Ok(Ok(_)) => tracing::debug!(container_id = %id, "Killed timed-out process group"),
            Ok(Err(e)) => {
                tracing::warn!(container_id = %id, error = %e, "Failed to kill timed-out process")
            }
            Err(_) => tracing::warn!(container_id = %id, "Kill of timed-out process hung"),
        }
    }
}

/// Exit code reported when the daemon never marks an exec as finished.
fn unsettled_exit_code(id: &ContainerId, exec_id: &str) -> i64 {
    tracing::warn!(container_id = %id, exec_id = %exec_id, "Exec still running after its output closed; reporting exit code -1");
    -1
}

/// A stuck `mkdir -p` before an upload is a rejected write, not a command timeout.
fn mkdir_error(display: &str, err: SandboxError) -> SandboxError {
    match err {
        SandboxError::TimedOut(_) => {
            SandboxError::write_rejected(display, "timed out creating the parent directory")
        }
        other => other,
    }
}

/// Wrapper that records the shell's pid so a timeout can kill its tree.
fn wrap_command(pid_file: &str) -> String {
    format!(
        "echo $$ > {pid}; sh -c \"$1\"; rc=$?; rm -f {pid}; exit $rc",
        pid = pid_file
    )
}

fn kill_script(pid_file: &str) -> String {
    format!(
        r#"pid=$(cat {pid} 2>/dev/null) || exit 0
kill_tree() {{
  for child in $(cat /proc/$1/task/*/children 2>/dev/null); do kill_tree "$child"; done
  kill -9 "$1" 2>/dev/null
}}
kill -9 -- "-$pid" 2>/dev/null
kill_tree "$pid"
rm -f {pid}
exit 0"#,
        pid = pid_file
    )
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn create_container(
        &self,
        limits: &ResourceLimits,
        bindings: &[VolumeBinding],
    ) -> Result<ContainerId> {
        let id = match self.create_once(limits, bindings).await {
            Ok(id) => id,
            Err(e) => match classify(e) {
                EngineFailure::Status { code: 404, .. } if limits.pull_missing_images => {
                    self.pull_image(&limits.image).await?;
                    self.create_once(limits, bindings)
                        .await
                        .map_err(|e| create_error(&limits.image, classify(e)))?
                }
                failure => return Err(create_error(&limits.image, failure)),
            },
        };

        tracing::info!(container_id = %id, image = %limits.image, network = limits.network_mode(), "Sandbox container created");
        Ok(id)
    }

    async fn start_container(&self, id: &ContainerId) -> Result<()> {
        self.docker
            .start_container::<String>(id.as_str(), None)
            .await
            .map_err(|e| match classify(e) {
                EngineFailure::Unavailable(msg) => SandboxError::EngineUnavailable(msg),
                EngineFailure::Status { message, .. } | EngineFailure::Other(message) => {
                    SandboxError::StartFailed(message)
                }
            })?;

        tracing::info!(container_id = %id, "Sandbox container started");
        Ok(())
    }

    async fn exec(&self, id: &ContainerId, command: &str, timeout: Duration) -> Result<ExecResult> {
        let pid_file = format!("/tmp/.cellbox-exec-{}.pid", uuid::Uuid::new_v4().simple());
        let cmd = vec![
            "sh".to_string(),
            "-c".to_string(),
            wrap_command(&pid_file),
            "cellbox".to_string(),
            command.to_string(),
        ];

        match tokio::time::timeout(timeout, self.run_exec(id, cmd)).await {
            Ok(collected) => {
                let (exec_id, stdout, stderr) = collected?;
                let exit_code = self.exit_code(id, &exec_id).await?;
                tracing::debug!(container_id = %id, exit_code, "Sandbox exec finished");
                Ok(ExecResult {
                    stdout,
                    stderr,
                    exit_code,
                })
            }
            Err(_) => {
                tracing::warn!(container_id = %id, command = %command, timeout_ms = timeout.as_millis() as u64, "Sandbox exec timed out");
                self.kill_exec(id, &pid_file).await;
                Err(SandboxError::TimedOut(timeout))
            }
        }
    }

    async fn copy_to_container(
        &self,
        id: &ContainerId,
        content: &[u8],
        path: &Path,
    ) -> Result<()> {
        use bollard::container::UploadToContainerOptions;

        let display = path.display().to_string();
        let (parent, file_name) = match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) => (parent.to_path_buf(), name.to_string_lossy().to_string()),
            _ => {
                return Err(SandboxError::write_rejected(display, "not a file path"));
            }
        };

        // Upload requires the target directory to exist.
        let mkdir = format!("mkdir -p '{}'", shell_quote_inner(&parent.to_string_lossy()));
        let result = self
            .exec(id, &mkdir, MKDIR_TIMEOUT)
            .await
            .map_err(|e| mkdir_error(&display, e))?;
        if !result.success() {
            return Err(SandboxError::write_rejected(display, result.stderr.trim().to_string()));
        }

        let data = content.to_vec();
        let archive = tokio::task::spawn_blocking(move || pack_file(&file_name, &data))
            .await
            .map_err(|e| SandboxError::engine(format!("Archive task failed: {}", e)))??;

        let options = UploadToContainerOptions {
            path: parent.to_string_lossy().to_string(),
            ..Default::default()
        };
        self.docker
            .upload_to_container(id.as_str(), Some(options), Bytes::from(archive))
            .await
            .map_err(|e| match classify(e) {
                EngineFailure::Unavailable(msg) => SandboxError::EngineUnavailable(msg),
                EngineFailure::Status { code: 400 | 403, message } => {
                    SandboxError::write_rejected(display.clone(), message)
                }
                EngineFailure::Status { code: 404, .. } => SandboxError::PathNotFound(display.clone()),
                EngineFailure::Status { message, .. } | EngineFailure::Other(message) => {
                    SandboxError::engine(format!("Failed to upload '{}': {}", display, message))
                }
            })?;

        tracing::debug!(container_id = %id, path = %path.display(), size_bytes = content.len(), "File copied into sandbox");
        Ok(())
    }

    async fn copy_from_container(&self, id: &ContainerId, path: &Path) -> Result<Vec<u8>> {
        use bollard::container::DownloadFromContainerOptions;

        let display = path.display().to_string();
        let options = DownloadFromContainerOptions {
            path: path.to_string_lossy().to_string(),
        };

        let mut stream = self.docker.download_from_container(id.as_str(), Some(options));
        let mut archive = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| match classify(e) {
                EngineFailure::Unavailable(msg) => SandboxError::EngineUnavailable(msg),
                EngineFailure::Status { code: 404, .. } => SandboxError::PathNotFound(display.clone()),
                EngineFailure::Status { message, .. } | EngineFailure::Other(message) => {
                    SandboxError::engine(format!("Failed to download '{}': {}", display, message))
                }
            })?;
            archive.extend_from_slice(&chunk);
        }

        let content = tokio::task::spawn_blocking(move || unpack_file(&archive, &display))
            .await
            .map_err(|e| SandboxError::engine(format!("Archive task failed: {}", e)))??;

        tracing::debug!(container_id = %id, path = %path.display(), size_bytes = content.len(), "File copied out of sandbox");
        Ok(content)
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<()> {
        use bollard::container::{RemoveContainerOptions, StopContainerOptions};

        if !force {
            // 304 (already stopped) and 404 (gone) are both fine here
            if let Err(e) = self
                .docker
                .stop_container(id.as_str(), Some(StopContainerOptions { t: STOP_GRACE_SECS }))
                .await
            {
                if let EngineFailure::Unavailable(msg) = classify(e) {
                    return Err(SandboxError::EngineUnavailable(msg));
                }
            }
        }

        let options = RemoveContainerOptions {
            force,
            v: true,
            ..Default::default()
        };
        match self.docker.remove_container(id.as_str(), Some(options)).await {
            Ok(()) => {
                tracing::info!(container_id = %id, "Sandbox container removed");
                Ok(())
            }
            Err(e) => match classify(e) {
                // Already gone, or removal already underway
                EngineFailure::Status { code: 404 | 409, .. } => {
                    tracing::debug!(container_id = %id, "Sandbox container already removed");
                    Ok(())
                }
                EngineFailure::Unavailable(msg) => Err(SandboxError::EngineUnavailable(msg)),
                EngineFailure::Status { message, .. } | EngineFailure::Other(message) => Err(
                    SandboxError::engine(format!("Failed to remove sandbox container: {}", message)),
                ),
            },
        }
    }

    async fn container_exists(&self, id: &ContainerId) -> Result<bool> {
        use bollard::container::InspectContainerOptions;

        match self
            .docker
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => match classify(e) {
                EngineFailure::Status { code: 404, .. } => Ok(false),
                EngineFailure::Unavailable(msg) => Err(SandboxError::EngineUnavailable(msg)),
                EngineFailure::Status { message, .. } | EngineFailure::Other(message) => {
                    Err(SandboxError::engine(message))
                }
            },
        }
    }

    async fn list_managed(&self) -> Result<Vec<ContainerId>> {
        use bollard::container::ListContainersOptions;

        let options = ListContainersOptions::<String> {
            all: true,
            filters: HashMap::from([(
                "label".to_string(),
                vec![format!("{}={}", MANAGED_BY_LABEL, MANAGED_BY_VALUE)],
            )]),
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| engine_error("Failed to list sandbox containers", e))?;

        Ok(containers
            .into_iter()
            .filter_map(|c| c.id.map(ContainerId))
            .collect())
    }

    async fn ping(&self) -> bool {
        self.docker.ping().await.is_ok()
    }
}

// =============================================================================
// Error classification
// =============================================================================

enum EngineFailure {
    /// The daemon could not be reached at all.
    Unavailable(String),
    /// The daemon answered with an HTTP error status.
    Status { code: u16, message: String },
    Other(String),
}

fn classify(err: BollardError) -> EngineFailure {
    match err {
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => EngineFailure::Status {
            code: status_code,
            message,
        },
        e @ (BollardError::SocketNotFoundError(_)
        | BollardError::IOError { .. }
        | BollardError::HyperResponseError { .. }
        | BollardError::HyperLegacyError { .. }
        | BollardError::RequestTimeoutError) => EngineFailure::Unavailable(e.to_string()),
        e => EngineFailure::Other(e.to_string()),
    }
}

/// Map a failed `create_container` call. A 404 or a malformed reference
/// both mean the image cannot be used.
fn create_error(image: &str, failure: EngineFailure) -> SandboxError {
    match failure {
        EngineFailure::Unavailable(msg) => SandboxError::EngineUnavailable(msg),
        EngineFailure::Status { code: 404, message } => SandboxError::ImageNotFound {
            image: image.to_string(),
            message,
        },
        EngineFailure::Status { code: 400, message } if is_bad_reference(&message) => {
            SandboxError::ImageNotFound {
                image: image.to_string(),
                message,
            }
        }
        EngineFailure::Status { message, .. } | EngineFailure::Other(message) => {
            SandboxError::engine(format!("Failed to create sandbox container: {}", message))
        }
    }
}

/// Docker answers "invalid reference format" for unparseable image names.
fn is_bad_reference(message: &str) -> bool {
    message.to_ascii_lowercase().contains("reference format")
}

fn engine_error(context: &str, err: BollardError) -> SandboxError {
    match classify(err) {
        EngineFailure::Unavailable(msg) => SandboxError::EngineUnavailable(msg),
        EngineFailure::Status { message, .. } | EngineFailure::Other(message) => {
            SandboxError::engine(format!("{}: {}", context, message))
        }
    }
}

// =============================================================================
// Tar helpers
// =============================================================================

/// Escape single quotes for use inside a single-quoted shell word.
fn shell_quote_inner(s: &str) -> String {
    s.replace('\'', r"'\''")
}

fn pack_file(name: &str, content: &[u8]) -> Result<Vec<u8>> {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default(),
    );

    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append_data(&mut header, name, content)
        .and_then(|_| builder.into_inner())
        .map_err(|e| SandboxError::engine(format!("Failed to build upload archive: {}", e)))
}

fn unpack_file(archive: &[u8], display: &str) -> Result<Vec<u8>> {
    let mut archive = tar::Archive::new(archive);
    let mut entries = archive
        .entries()
        .map_err(|e| SandboxError::engine(format!("Corrupt download archive: {}", e)))?;

    let mut entry = match entries.next() {
        Some(Ok(entry)) => entry,
        Some(Err(e)) => {
            return Err(SandboxError::engine(format!("Corrupt download archive: {}", e)))
        }
        None => return Err(SandboxError::PathNotFound(display.to_string())),
    };

    if !entry.header().entry_type().is_file() {
        return Err(SandboxError::PathNotFound(format!(
            "{} (not a regular file)",
            display
        )));
    }

    let mut content = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut content)
        .map_err(|e| SandboxError::engine(format!("Failed to read download archive: {}", e)))?;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_then_unpack_file() {
        let archive = pack_file("my_file.txt", b"Hello from the sandbox!").unwrap();
        let content = unpack_file(&archive, "/workspace/my_file.txt").unwrap();
        assert_eq!(content, b"Hello from the sandbox!");
    }

    #[test]
    fn test_unpack_rejects_directories() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        builder
            .append_data(&mut header, "src/", std::io::empty())
            .unwrap();
        let archive = builder.into_inner().unwrap();

        let err = unpack_file(&archive, "/workspace/src").unwrap_err();
        assert!(matches!(err, SandboxError::PathNotFound(_)));
    }

    #[test]
    fn test_empty_archive_is_not_found() {
        let archive = tar::Builder::new(Vec::new()).into_inner().unwrap();
        assert!(matches!(
            unpack_file(&archive, "/x"),
            Err(SandboxError::PathNotFound(_))
        ));
    }

    #[test]
    fn test_wrapper_records_pid_and_propagates_exit_code() {
        let script = wrap_command("/tmp/.cellbox-exec-1.pid");
        assert!(script.starts_with("echo $$ > /tmp/.cellbox-exec-1.pid;"));
        assert!(script.contains("sh -c \"$1\""));
        assert!(script.ends_with("exit $rc"));
    }

    #[test]
    fn test_kill_script_targets_group_and_tree() {
        let script = kill_script("/tmp/p.pid");
        assert!(script.contains("kill -9 -- \"-$pid\""));
        assert!(script.contains("kill_tree \"$pid\""));
    }

    #[test]
    fn test_shell_quote_inner() {
        assert_eq!(shell_quote_inner("/workspace/it's"), r"/workspace/it'\''s");
    }

    #[test]
    fn test_classify_status_and_transport() {
        let status = classify(BollardError::DockerResponseServerError {
            status_code: 404,
            message: "No such image: nope".into(),
        });
        assert!(matches!(status, EngineFailure::Status { code: 404, .. }));

        let transport = classify(BollardError::SocketNotFoundError("/var/run/docker.sock".into()));
        assert!(matches!(transport, EngineFailure::Unavailable(_)));
    }

    #[test]
    fn test_mkdir_timeout_is_write_rejected() {
        let err = mkdir_error("/workspace/a/b.txt", SandboxError::TimedOut(MKDIR_TIMEOUT));
        assert!(matches!(err, SandboxError::WriteRejected { .. }), "{err:?}");

        let err = mkdir_error("/workspace/a/b.txt", SandboxError::EngineUnavailable("gone".into()));
        assert!(matches!(err, SandboxError::EngineUnavailable(_)));
    }

    #[test]
    fn test_unsettled_exec_reports_minus_one() {
        let id = ContainerId("cellbox-test".into());
        assert_eq!(unsettled_exit_code(&id, "exec-1"), -1);
    }

    #[test]
    fn test_create_error_mapping() {
        let bad_ref = create_error(
            "Alpine:Latest",
            EngineFailure::Status {
                code: 400,
                message: "invalid reference format: repository name must be lowercase".into(),
            },
        );
        match bad_ref {
            SandboxError::ImageNotFound { image, message } => {
                assert_eq!(image, "Alpine:Latest");
                assert!(message.contains("invalid reference format"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let missing = create_error(
            "nope:1",
            EngineFailure::Status {
                code: 404,
                message: "No such image: nope:1".into(),
            },
        );
        assert!(matches!(missing, SandboxError::ImageNotFound { .. }));

        let conflict = create_error(
            "alpine",
            EngineFailure::Status {
                code: 400,
                message: "conflicting options: hostname and the network mode".into(),
            },
        );
        assert!(matches!(conflict, SandboxError::Engine(_)));

        let down = create_error("alpine", EngineFailure::Unavailable("refused".into()));
        assert!(matches!(down, SandboxError::EngineUnavailable(_)));
    }

    #[tokio::test]
    async fn test_refused_connection_is_engine_unavailable() {
        // Nothing listens on port 1; every request fails at connect time.
        let docker = bollard::Docker::connect_with_http(
            "http://127.0.0.1:1",
            5,
            bollard::API_DEFAULT_VERSION,
        )
        .unwrap();
        let engine = DockerEngine::from_client(docker);

        let err = engine
            .create_container(&ResourceLimits::new("alpine:3.20"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::EngineUnavailable(_)), "{err:?}");

        let id = ContainerId("cellbox-missing".into());
        let err = engine.start_container(&id).await.unwrap_err();
        assert!(matches!(err, SandboxError::EngineUnavailable(_)), "{err:?}");

        let err = engine.container_exists(&id).await.unwrap_err();
        assert!(matches!(err, SandboxError::EngineUnavailable(_)), "{err:?}");
        assert!(!engine.ping().await);
    }

    /// Requires a running Docker daemon and the `alpine` image.
    #[tokio::test]
    #[ignore]
    async fn test_docker_create_exec_remove() {
        let engine = DockerEngine::new().unwrap();
        let limits = ResourceLimits::new("alpine:3.20");
        let id = engine.create_container(&limits, &[]).await.unwrap();
        engine.start_container(&id).await.unwrap();

        let out = engine.exec(&id, "echo 4", Duration::from_secs(5)).await.unwrap();
        assert_eq!(out.stdout, "4\n");
        assert_eq!(out.exit_code, 0);

        engine.remove_container(&id, true).await.unwrap();
        assert!(!engine.container_exists(&id).await.unwrap());
    }
}
