//! Tool capability traits.

use crate::error::Result;
use crate::types::{ToolDefinition, ToolOutput, ToolRiskLevel};
use async_trait::async_trait;
use serde_json::Value;

/// Tool interface for atomic operations.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the unique name of the tool.
    fn name(&self) -> &str;

    /// Get the human-readable description.
    fn description(&self) -> &str;

    /// Get the JSON Schema for parameters.
    fn parameters(&self) -> Value;

    /// Risk classification; read-only tools keep the default.
    fn risk_level(&self) -> ToolRiskLevel {
        ToolRiskLevel::Low
    }

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: Value) -> Result<ToolOutput>;

    /// Registry-facing definition of this tool.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
            risk_level: self.risk_level(),
        }
    }
}

/// Tool registry for managing available tools.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Register a new tool.
    async fn register(&self, tool: Box<dyn Tool>) -> Result<()>;

    /// Check whether a tool is registered.
    async fn contains(&self, name: &str) -> bool;

    /// List all available tools.
    async fn list(&self) -> Result<Vec<ToolDefinition>>;

    /// Execute a tool by name with arguments.
    async fn execute(&self, name: &str, args: Value) -> Result<ToolOutput>;
}
