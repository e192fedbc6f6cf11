//! Sandbox error taxonomy.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Every way a sandbox operation can fail.
///
/// Engine failures carry the daemon's diagnostic text verbatim. Precondition
/// failures are local and fatal only to the call that hit them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SandboxError {
    // =========================================================================
    // Engine Errors
    // =========================================================================
    #[error("Container engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Image not found: {image}: {message}")]
    ImageNotFound { image: String, message: String },

    #[error("Container failed to start: {0}")]
    StartFailed(String),

    /// Any other daemon-reported failure.
    #[error("Container engine error: {0}")]
    Engine(String),

    // =========================================================================
    // Precondition Errors
    // =========================================================================
    #[error("Sandbox already created")]
    AlreadyCreated,

    #[error("Client already owns an active sandbox")]
    AlreadyActive,

    #[error("Sandbox not initialized")]
    NotInitialized,

    #[error("Invalid volume binding: {0}")]
    InvalidBinding(String),

    #[error("Invalid resource limits: {0}")]
    InvalidLimits(String),

    #[error("Path escapes the sandbox's writable mounts: {0}")]
    PathEscape(String),

    // =========================================================================
    // Operation Errors
    // =========================================================================
    #[error("Path not found in sandbox: {0}")]
    PathNotFound(String),

    #[error("Write rejected at {path}: {message}")]
    WriteRejected { path: String, message: String },

    #[error("Command timed out after {0:?}")]
    TimedOut(Duration),
}

impl SandboxError {
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    pub fn invalid_binding(msg: impl Into<String>) -> Self {
        Self::InvalidBinding(msg.into())
    }

    pub fn invalid_limits(msg: impl Into<String>) -> Self {
        Self::InvalidLimits(msg.into())
    }

    pub fn write_rejected(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WriteRejected {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Failure reported by (or about) the container daemon.
    pub fn is_engine_failure(&self) -> bool {
        matches!(
            self,
            Self::EngineUnavailable(_)
                | Self::ImageNotFound { .. }
                | Self::StartFailed(_)
                | Self::Engine(_)
        )
    }

    /// Contract violation by the caller.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::AlreadyCreated
                | Self::AlreadyActive
                | Self::NotInitialized
                | Self::InvalidBinding(_)
                | Self::InvalidLimits(_)
                | Self::PathEscape(_)
        )
    }

    /// The sandbox stays usable after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::TimedOut(_) | Self::PathNotFound(_) | Self::WriteRejected { .. }
        ) || self.is_precondition()
    }
}

impl From<SandboxError> for cellbox_core::Error {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::PathEscape(_) => cellbox_core::Error::security_violation(err.to_string()),
            SandboxError::TimedOut(_) => cellbox_core::Error::timeout(err.to_string()),
            SandboxError::InvalidBinding(_) | SandboxError::InvalidLimits(_) => {
                cellbox_core::Error::invalid_request(err.to_string())
            }
            other => cellbox_core::Error::tool_execution(other.to_string()),
        }
    }
}
