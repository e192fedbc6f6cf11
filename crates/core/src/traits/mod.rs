//! Core traits for cellbox.
//!
//! - `skills`: tool capability interface (Tool, ToolRegistry)
//! - `events`: audit event sinks (EventEmitter)

pub mod events;
pub mod skills;

pub use events::*;
pub use skills::*;
