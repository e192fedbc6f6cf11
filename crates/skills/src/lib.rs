#![deny(unused)]
//! Tool registry for cellbox.
//!
//! This crate provides:
//! - A concurrent tool registry keyed by tool name
//! - `SandboxToolKind`, the closed set of sandbox-backed tools and their
//!   constructors

pub mod kinds;
pub mod registry;

pub use kinds::{register_sandbox_tools, SandboxToolKind, ToolSettings};
pub use registry::DefaultToolRegistry;
