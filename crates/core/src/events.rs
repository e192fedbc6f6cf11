use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structured audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: String,
    /// Sandbox the event belongs to (if any)
    pub sandbox_id: Option<String>,
    /// Component that emitted the event
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub severity: EventSeverity,
    /// Event-specific data
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    pub fn new(event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sandbox_id: None,
            actor: "system".to_string(),
            timestamp: Utc::now(),
            event_type,
            severity: EventSeverity::Info,
            payload,
        }
    }

    pub fn with_sandbox(mut self, sandbox_id: &str) -> Self {
        self.sandbox_id = Some(sandbox_id.to_string());
        self
    }

    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    pub fn with_severity(mut self, severity: EventSeverity) -> Self {
        self.severity = severity;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Container provisioned and running
    SandboxCreated,
    /// Container removed
    SandboxDestroyed,
    /// Command execution finished (including timeouts)
    ToolExecFinished,
    /// File copied out of the sandbox
    FsRead,
    /// File copied into the sandbox
    FsWrite,
    /// Failure worth auditing
    SystemError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LifecyclePayload {
    pub container_id: Option<String>,
    pub image: String,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolExecPayload {
    pub command: String,
    pub exit_code: Option<i64>,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FsPayload {
    pub path: String,
    pub operation: String, // "read", "write"
    pub size_bytes: Option<u64>,
    pub success: bool,
    pub error: Option<String>,
}
