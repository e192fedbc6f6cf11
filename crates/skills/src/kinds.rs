//! The closed set of sandbox-backed tools.
//!
//! Config files name tools by string; parsing happens once into
//! [`SandboxToolKind`] and construction is a plain `match`.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use cellbox_core::config::SandboxSettings;
use cellbox_core::traits::{Tool, ToolRegistry};
use cellbox_core::{Error, Result};
use cellbox_sandbox::tools::{DEFAULT_TIMEOUT_SECS, MAX_TIMEOUT_SECS};
use cellbox_sandbox::{SandboxClient, SandboxReadFileTool, SandboxShellTool, SandboxWriteFileTool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxToolKind {
    Shell,
    ReadFile,
    WriteFile,
}

impl SandboxToolKind {
    pub fn all() -> &'static [SandboxToolKind] {
        &[Self::Shell, Self::ReadFile, Self::WriteFile]
    }

    /// Config spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::ReadFile => "read_file",
            Self::WriteFile => "write_file",
        }
    }

    /// Build the tool over a shared client.
    pub fn build(&self, client: Arc<SandboxClient>, settings: &ToolSettings) -> Box<dyn Tool> {
        match self {
            Self::Shell => Box::new(
                SandboxShellTool::new(client)
                    .with_timeouts(settings.default_timeout_secs, settings.max_timeout_secs),
            ),
            Self::ReadFile => Box::new(SandboxReadFileTool::new(client)),
            Self::WriteFile => Box::new(SandboxWriteFileTool::new(client)),
        }
    }
}

impl fmt::Display for SandboxToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SandboxToolKind {
    type Err = Error;

    /// Accepts both the config spelling and the registered tool name.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "shell" | "sandbox_shell" => Ok(Self::Shell),
            "read_file" | "sandbox_read_file" => Ok(Self::ReadFile),
            "write_file" | "sandbox_write_file" => Ok(Self::WriteFile),
            other => Err(Error::invalid_request(format!(
                "Unknown sandbox tool '{}'",
                other
            ))),
        }
    }
}

/// Per-tool knobs taken from the sandbox settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSettings {
    pub default_timeout_secs: u64,
    pub max_timeout_secs: u64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_timeout_secs: MAX_TIMEOUT_SECS,
        }
    }
}

impl From<&SandboxSettings> for ToolSettings {
    fn from(settings: &SandboxSettings) -> Self {
        Self {
            default_timeout_secs: settings.default_timeout_secs,
            max_timeout_secs: settings.max_timeout_secs,
        }
    }
}

/// Parse `names` and register each tool once.
///
/// All names are parsed before anything is registered, so a typo leaves the
/// registry untouched.
pub async fn register_sandbox_tools(
    registry: &dyn ToolRegistry,
    client: Arc<SandboxClient>,
    settings: &ToolSettings,
    names: &[String],
) -> Result<Vec<SandboxToolKind>> {
    let mut kinds = Vec::with_capacity(names.len());
    for name in names {
        let kind: SandboxToolKind = name.parse()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }

    for kind in &kinds {
        registry.register(kind.build(client.clone(), settings)).await?;
    }
    tracing::info!(count = kinds.len(), "Sandbox tools registered");
    Ok(kinds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DefaultToolRegistry;
    use cellbox_core::types::ToolRiskLevel;
    use cellbox_sandbox::{MockEngine, ResourceLimits};
    use serde_json::json;

    fn client() -> Arc<SandboxClient> {
        Arc::new(SandboxClient::new(Arc::new(MockEngine::new())))
    }

    #[test]
    fn test_parse_kinds() {
        assert_eq!("shell".parse::<SandboxToolKind>().unwrap(), SandboxToolKind::Shell);
        assert_eq!(
            "sandbox_read_file".parse::<SandboxToolKind>().unwrap(),
            SandboxToolKind::ReadFile
        );
        assert!("list_files".parse::<SandboxToolKind>().is_err());
        for kind in SandboxToolKind::all() {
            assert_eq!(kind.to_string().parse::<SandboxToolKind>().unwrap(), *kind);
        }
    }

    #[test]
    fn test_build_names_match_kinds() {
        let settings = ToolSettings::default();
        let shell = SandboxToolKind::Shell.build(client(), &settings);
        assert_eq!(shell.name(), "sandbox_shell");
        assert_eq!(shell.risk_level(), ToolRiskLevel::High);
        assert_eq!(
            SandboxToolKind::WriteFile.build(client(), &settings).name(),
            "sandbox_write_file"
        );
    }

    #[tokio::test]
    async fn test_register_from_config_names() {
        let registry = DefaultToolRegistry::new();
        let names = vec!["shell".to_string(), "read_file".into(), "shell".into()];
        let kinds = register_sandbox_tools(&registry, client(), &ToolSettings::default(), &names)
            .await
            .unwrap();

        assert_eq!(kinds, vec![SandboxToolKind::Shell, SandboxToolKind::ReadFile]);
        let listed: Vec<_> = registry.list().await.unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(listed, vec!["sandbox_read_file", "sandbox_shell"]);
    }

    #[tokio::test]
    async fn test_unknown_name_registers_nothing() {
        let registry = DefaultToolRegistry::new();
        let names = vec!["shell".to_string(), "rm_rf".into()];
        let result =
            register_sandbox_tools(&registry, client(), &ToolSettings::default(), &names).await;
        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_registry_executes_against_sandbox() {
        let client = client();
        client
            .create(ResourceLimits::new("alpine:3.20"), Vec::new())
            .await
            .unwrap();

        let registry = DefaultToolRegistry::new();
        let names: Vec<String> = SandboxToolKind::all().iter().map(|k| k.to_string()).collect();
        register_sandbox_tools(&registry, client.clone(), &ToolSettings::default(), &names)
            .await
            .unwrap();

        registry
            .execute("sandbox_write_file", json!({"path": "a.txt", "content": "hi"}))
            .await
            .unwrap();
        let read = registry
            .execute("sandbox_read_file", json!({"path": "a.txt"}))
            .await
            .unwrap();
        assert_eq!(read.content, "hi");

        let out = registry
            .execute("sandbox_shell", json!({"command": "echo 4"}))
            .await
            .unwrap();
        assert_eq!(out.content, "4\n");

        client.cleanup().await;
    }
}
