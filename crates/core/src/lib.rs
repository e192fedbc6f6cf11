#![deny(unused)]
//! Core types, traits, and error definitions for cellbox.
//!
//! This crate provides the building blocks shared by the sandbox, the tool
//! registry and the CLI: configuration, telemetry, audit events, path policy
//! and the tool capability interface.

pub mod config;
pub mod error;
pub mod events;
pub mod fs_policy;
pub mod telemetry;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use events::*;
pub use traits::*;
pub use types::*;
