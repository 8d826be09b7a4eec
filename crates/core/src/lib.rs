//! Core types and utilities for steward
//!
//! This is the foundation crate (Layer 0) that all other steward crates depend on.
//! It provides:
//! - Base error types
//! - Hook identity (`HookKind`, `HookInfo`)
//!
//! This crate has no dependencies on other steward crates.

pub mod error;
pub mod hook;

pub use error::{Error, Result};
pub use hook::{HookInfo, HookKind};
