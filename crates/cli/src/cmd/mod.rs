//! CLI command implementations

pub mod hook;
pub mod resolved;
pub mod run;
pub mod status;
