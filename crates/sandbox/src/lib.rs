#![deny(unused)]
//! Isolated command execution for cellbox.
//!
//! Untrusted commands run inside a resource-limited container; the host is
//! reachable only through explicitly bound directories.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │  Tools (SandboxShellTool, etc.)        │
//! │    ↓ delegates to SandboxClient        │
//! ├────────────────────────────────────────┤
//! │  SandboxClient (zero or one Sandbox)   │
//! │    ↓ validates limits, resolves binds  │
//! ├────────────────────────────────────────┤
//! │  Sandbox (state machine, path policy)  │
//! │    ↓ ContainerEngine trait             │
//! ├────────────────────────────────────────┤
//! │  DockerEngine (bollard) / MockEngine   │
//! │    ↓ Docker API                        │
//! ├────────────────────────────────────────┤
//! │  Container                             │
//! │    read-only rootfs, volume work dir,  │
//! │    no caps, network off by default     │
//! └────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use cellbox_sandbox::{DockerEngine, ResourceLimits, SandboxClient};
//!
//! let client = SandboxClient::new(Arc::new(DockerEngine::new()?));
//! client.create(ResourceLimits::new("python:3.12-slim"), Vec::new()).await?;
//! let out = client.run_command("python3 -c 'print(2+2)'", Duration::from_secs(10)).await;
//! client.cleanup().await;
//! ```

pub mod bindings;
pub mod client;
pub mod docker;
pub mod engine;
pub mod error;
pub mod limits;
pub mod mock;
pub mod sandbox;
pub mod tools;

pub use bindings::{MountAccess, MountTable, VolumeBinding, VolumeBindingResolver};
pub use client::SandboxClient;
pub use docker::DockerEngine;
pub use engine::{reap_orphans, ContainerEngine, ContainerId, ExecResult};
pub use error::{Result, SandboxError};
pub use limits::ResourceLimits;
pub use mock::MockEngine;
pub use sandbox::{Sandbox, SandboxState};
pub use tools::{SandboxReadFileTool, SandboxShellTool, SandboxWriteFileTool};
