//! Top-level subcommand orchestration.
pub mod build;
