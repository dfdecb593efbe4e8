//! Small helpers shared across the workspace: environment lookups and TOML config files.

pub mod config;
pub mod env;
