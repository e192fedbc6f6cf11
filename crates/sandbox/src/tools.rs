//! Sandbox tools implementing the `Tool` trait.
//!
//! Each tool talks to a shared [`SandboxClient`]; none of them creates or
//! destroys the sandbox. Command failures (timeouts, non-zero exits) come back
//! as failed `ToolOutput`s so a caller can react to them, while misuse
//! (no sandbox, escaping paths) surfaces as `Err`.

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use cellbox_core::{traits::Tool, types::ToolOutput, types::ToolRiskLevel, Error, Result};

use crate::client::SandboxClient;
use crate::error::SandboxError;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const MAX_TIMEOUT_SECS: u64 = 300;

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::invalid_request(format!("{} is required", key)))
}

// =============================================================================
// Sandbox Shell Tool
// =============================================================================

/// Tool for executing shell commands inside the sandbox.
///
/// Risk level: HIGH.
pub struct SandboxShellTool {
    client: Arc<SandboxClient>,
    default_timeout_secs: u64,
    max_timeout_secs: u64,
}

impl SandboxShellTool {
    pub fn new(client: Arc<SandboxClient>) -> Self {
        Self {
            client,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_timeout_secs: MAX_TIMEOUT_SECS,
        }
    }

    /// Override the default and maximum per-command timeouts.
    pub fn with_timeouts(mut self, default_secs: u64, max_secs: u64) -> Self {
        self.max_timeout_secs = max_secs.max(1);
        self.default_timeout_secs = default_secs.clamp(1, self.max_timeout_secs);
        self
    }
}

#[async_trait]
impl Tool for SandboxShellTool {
    fn name(&self) -> &str {
        "sandbox_shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command inside the isolated sandbox container. \
         The command runs through `sh -c` in the sandbox work directory \
         and has no access to the host beyond the configured bindings."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": format!(
                        "Timeout in seconds (default: {}, max: {})",
                        self.default_timeout_secs, self.max_timeout_secs
                    ),
                    "default": self.default_timeout_secs
                }
            },
            "required": ["command"]
        })
    }

    fn risk_level(&self) -> ToolRiskLevel {
        ToolRiskLevel::High
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let command = required_str(&args, "command")?;
        let timeout_secs = args
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.default_timeout_secs)
            .clamp(1, self.max_timeout_secs);

        let result = match self
            .client
            .run_command(command, Duration::from_secs(timeout_secs))
            .await
        {
            Ok(result) => result,
            Err(SandboxError::TimedOut(_)) => {
                return Ok(ToolOutput::error(format!(
                    "Command timed out after {}s and was killed.",
                    timeout_secs
                ))
                .with_data(json!({
                    "exit_code": null,
                    "timed_out": true,
                })));
            }
            Err(e) => return Err(e.into()),
        };

        let mut output = String::new();
        if !result.stdout.is_empty() {
            output.push_str(&result.stdout);
        }
        if !result.stderr.is_empty() {
            if !output.is_empty() {
                output.push_str("\n--- stderr ---\n");
            }
            output.push_str(&result.stderr);
        }
        if output.is_empty() {
            output = format!("Command completed with exit code {}", result.exit_code);
        }

        let data = json!({
            "exit_code": result.exit_code,
            "timed_out": false,
        });
        if result.success() {
            Ok(ToolOutput::text(output).with_data(data))
        } else {
            Ok(ToolOutput::error(format!(
                "Command failed (exit code {}):\n{}",
                result.exit_code, output
            ))
            .with_data(data))
        }
    }
}

// =============================================================================
// Sandbox Write File Tool
// =============================================================================

/// Tool for writing files into the sandbox.
///
/// Risk level: MEDIUM.
pub struct SandboxWriteFileTool {
    client: Arc<SandboxClient>,
}

impl SandboxWriteFileTool {
    pub fn new(client: Arc<SandboxClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for SandboxWriteFileTool {
    fn name(&self) -> &str {
        "sandbox_write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file inside the isolated sandbox. \
         Relative paths resolve against the sandbox work directory; \
         missing parent directories are created."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path, relative to the work directory or absolute inside a writable binding"
                },
                "content": {
                    "type": "string",
                    "description": "The file content to write"
                },
                "encoding": {
                    "type": "string",
                    "enum": ["utf8", "base64"],
                    "default": "utf8"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn risk_level(&self) -> ToolRiskLevel {
        ToolRiskLevel::Medium
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let path = required_str(&args, "path")?;
        let content = required_str(&args, "content")?;
        let bytes = match args.get("encoding").and_then(|v| v.as_str()) {
            None | Some("utf8") => content.as_bytes().to_vec(),
            Some("base64") => base64::engine::general_purpose::STANDARD
                .decode(content)
                .map_err(|e| Error::invalid_request(format!("Invalid base64 content: {}", e)))?,
            Some(other) => {
                return Err(Error::invalid_request(format!(
                    "Unsupported encoding: {}",
                    other
                )))
            }
        };

        match self.client.write_file(path, &bytes).await {
            Ok(()) => Ok(ToolOutput::text(format!(
                "File written: {} ({} bytes)",
                path,
                bytes.len()
            ))
            .with_data(json!({ "path": path, "size_bytes": bytes.len() }))),
            Err(SandboxError::WriteRejected { path, message }) => Ok(ToolOutput::error(format!(
                "Write to {} rejected: {}",
                path, message
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// Sandbox Read File Tool
// =============================================================================

/// Tool for reading files from the sandbox.
///
/// Risk level: LOW.
pub struct SandboxReadFileTool {
    client: Arc<SandboxClient>,
}

impl SandboxReadFileTool {
    pub fn new(client: Arc<SandboxClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for SandboxReadFileTool {
    fn name(&self) -> &str {
        "sandbox_read_file"
    }

    fn description(&self) -> &str {
        "Read the content of a file from the isolated sandbox. \
         Binary content is returned base64-encoded."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path, relative to the work directory or absolute inside a writable binding"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let path = required_str(&args, "path")?;

        let bytes = match self.client.read_file(path).await {
            Ok(bytes) => bytes,
            Err(SandboxError::PathNotFound(p)) => {
                return Ok(ToolOutput::error(format!("File not found: {}", p)));
            }
            Err(e) => return Err(e.into()),
        };

        let size = bytes.len();
        match String::from_utf8(bytes) {
            Ok(text) => Ok(ToolOutput::text(text).with_data(json!({
                "encoding": "utf8",
                "size_bytes": size,
            }))),
            Err(e) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(e.as_bytes());
                Ok(ToolOutput::text(format!("<binary file, {} bytes>", size)).with_data(
                    json!({
                        "encoding": "base64",
                        "content": encoded,
                        "size_bytes": size,
                    }),
                ))
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ExecResult;
    use crate::limits::ResourceLimits;
    use crate::mock::MockEngine;

    async fn ready_client(engine: MockEngine) -> Arc<SandboxClient> {
        let client = Arc::new(SandboxClient::new(Arc::new(engine)));
        client
            .create(ResourceLimits::new("alpine:3.20"), Vec::new())
            .await
            .unwrap();
        client
    }

    #[tokio::test]
    async fn test_shell_tool_success() {
        let client = ready_client(MockEngine::new()).await;
        let tool = SandboxShellTool::new(client);
        let result = tool.execute(json!({"command": "echo 4"})).await.unwrap();

        assert!(result.success);
        assert_eq!(result.content, "4\n");
        assert_eq!(result.data.unwrap()["exit_code"], 0);
    }

    #[tokio::test]
    async fn test_shell_tool_failure() {
        let engine = MockEngine::new().with_exec_responses(vec![ExecResult {
            exit_code: 127,
            stdout: String::new(),
            stderr: "sh: nonexistent_command: not found".into(),
        }]);
        let tool = SandboxShellTool::new(ready_client(engine).await);

        let result = tool
            .execute(json!({"command": "nonexistent_command"}))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.content.contains("exit code 127"));
        assert!(result.content.contains("not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shell_tool_timeout() {
        let tool = SandboxShellTool::new(ready_client(MockEngine::new()).await);
        let result = tool
            .execute(json!({"command": "sleep 999", "timeout_secs": 1}))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.content.contains("timed out"));
        assert_eq!(result.data.unwrap()["timed_out"], true);
    }

    #[tokio::test]
    async fn test_shell_tool_timeout_is_capped() {
        let client = Arc::new(SandboxClient::new(Arc::new(MockEngine::new())));
        let tool = SandboxShellTool::new(client).with_timeouts(60, 10);
        assert_eq!(tool.default_timeout_secs, 10);
        assert_eq!(tool.parameters()["properties"]["timeout_secs"]["default"], 10);
    }

    #[tokio::test]
    async fn test_shell_tool_without_sandbox_is_error() {
        let client = Arc::new(SandboxClient::new(Arc::new(MockEngine::new())));
        let tool = SandboxShellTool::new(client);
        let err = tool.execute(json!({"command": "echo 4"})).await.unwrap_err();
        assert!(err.to_string().contains("not initialized"));
    }

    #[tokio::test]
    async fn test_write_file_path_escape() {
        let tool = SandboxWriteFileTool::new(ready_client(MockEngine::new()).await);
        let result = tool
            .execute(json!({"path": "../../../etc/passwd", "content": "evil"}))
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, Error::SecurityViolation(_)));
    }

    #[tokio::test]
    async fn test_read_file_outside_work_dir() {
        let tool = SandboxReadFileTool::new(ready_client(MockEngine::new()).await);
        let result = tool.execute(json!({"path": "/etc/passwd"})).await;
        assert!(matches!(result.unwrap_err(), Error::SecurityViolation(_)));
    }

    #[tokio::test]
    async fn test_missing_argument() {
        let tool = SandboxReadFileTool::new(ready_client(MockEngine::new()).await);
        let err = tool.execute(json!({})).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_write_and_read_file() {
        let client = ready_client(MockEngine::new()).await;
        let write_tool = SandboxWriteFileTool::new(client.clone());
        let read_tool = SandboxReadFileTool::new(client);

        let written = write_tool
            .execute(json!({"path": "src/hello.txt", "content": "Hello World"}))
            .await
            .unwrap();
        assert!(written.success);

        let read = read_tool
            .execute(json!({"path": "src/hello.txt"}))
            .await
            .unwrap();
        assert!(read.success);
        assert_eq!(read.content, "Hello World");
    }

    #[tokio::test]
    async fn test_binary_round_trip_uses_base64() {
        let client = ready_client(MockEngine::new()).await;
        let write_tool = SandboxWriteFileTool::new(client.clone());
        let read_tool = SandboxReadFileTool::new(client);

        let payload = base64::engine::general_purpose::STANDARD.encode([0xffu8, 0x00, 0xfe]);
        write_tool
            .execute(json!({"path": "blob.bin", "content": payload, "encoding": "base64"}))
            .await
            .unwrap();

        let read = read_tool.execute(json!({"path": "blob.bin"})).await.unwrap();
        let data = read.data.unwrap();
        assert_eq!(data["encoding"], "base64");
        assert_eq!(data["content"], payload);
        assert_eq!(data["size_bytes"], 3);
    }

    #[tokio::test]
    async fn test_read_missing_file_is_failed_output() {
        let tool = SandboxReadFileTool::new(ready_client(MockEngine::new()).await);
        let result = tool.execute(json!({"path": "nope.txt"})).await.unwrap();
        assert!(!result.success);
        assert!(result.content.contains("not found"));
    }
}
