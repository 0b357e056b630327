//! Provisioning engine.
//!
//! Builds the software a fresh system needs from declarative resource
//! files: installers, package files, archives, static assets and package
//! repository installs, each downloaded if remote, ordered by dependency,
//! and gated behind a one-time installation agreement.
//!
//! The public API is organised into layers:
//!
//! - **[`config`]**: load resource files and user settings
//! - **[`resources`]**: the resource model and its acquire/install lifecycle
//! - **[`pipeline`]**: dependency-ordered build of many resources
//! - **[`commands`]**: top-level subcommand orchestration (`build`)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod agreement;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod download;
pub mod error;
pub mod exec;
pub mod logging;
pub mod pipeline;
pub mod platform;
pub mod resources;
