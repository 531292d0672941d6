//! CLI command implementations.
//!
//! Each submodule implements a benchbox CLI command with pure core logic
//! separated from IO for testability.

pub mod run;
pub mod show_config;
