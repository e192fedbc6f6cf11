//! Core type definitions for cellbox.

pub mod tool;

pub use tool::*;
