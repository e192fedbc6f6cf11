//! Error types shared across cellbox crates.

use thiserror::Error;

/// Result type alias using cellbox's core Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for cellbox.
///
/// Sandbox-level failures have their own taxonomy in `cellbox_sandbox`; this
/// type is what crosses the tool capability boundary.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Tool Errors
    // =========================================================================
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Security violation: {0}")]
    SecurityViolation(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a tool not found error.
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound(name.into())
    }

    /// Create a tool execution error.
    pub fn tool_execution(msg: impl Into<String>) -> Self {
        Self::ToolExecution(msg.into())
    }

    /// Create a security violation error.
    pub fn security_violation(msg: impl Into<String>) -> Self {
        Self::SecurityViolation(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }
}
