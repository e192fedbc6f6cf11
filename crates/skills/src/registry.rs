//! Tool registry implementation.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use cellbox_core::{
    traits::{Tool, ToolRegistry},
    types::{ToolDefinition, ToolOutput},
    Error, Result,
};

/// Default tool registry using DashMap.
pub struct DefaultToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
}

impl DefaultToolRegistry {
    /// Create a new tool registry.
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
        }
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Shared handle to a registered tool.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|entry| entry.value().clone())
    }
}

impl Default for DefaultToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRegistry for DefaultToolRegistry {
    async fn register(&self, tool: Box<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        tracing::info!(tool = %name, risk = ?tool.risk_level(), "Registering tool");

        match self.tools.entry(name) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Err(Error::invalid_request(
                format!("Tool '{}' is already registered", entry.key()),
            )),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Arc::from(tool));
                Ok(())
            }
        }
    }

    async fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    async fn list(&self) -> Result<Vec<ToolDefinition>> {
        let mut definitions: Vec<_> = self
            .tools
            .iter()
            .map(|entry| entry.value().definition())
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(definitions)
    }

    async fn execute(&self, name: &str, args: serde_json::Value) -> Result<ToolOutput> {
        // Clone out of the map so no shard lock is held across the await.
        let tool = self.get(name).ok_or_else(|| Error::tool_not_found(name))?;

        tracing::debug!(tool = %name, "Executing tool");
        tool.execute(args).await
    }
}
