//! Command-line interface definitions.
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Top-level CLI entry point for the provisioning engine.
#[derive(Parser, Debug)]
#[command(
    name = "provision",
    about = "Download and install the resources a fresh system needs",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone)]
pub struct GlobalOpts {
    /// Settings file (defaults to <config dir>/provision/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Acquire and install every resource declared in the given files
    Build(BuildOpts),
    /// Print shell completions to stdout
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
    /// Print version information
    Version,
}

/// Options for the `build` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct BuildOpts {
    /// Resource file to build (repeatable)
    #[arg(short, long = "file", value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,

    /// Directory artifacts are downloaded into
    #[arg(long)]
    pub download_dir: Option<PathBuf>,

    /// Keep building remaining resources after a failure
    #[arg(short = 'k', long)]
    pub continue_on_error: bool,

    /// Accept the installation agreement without prompting
    #[arg(short = 'y', long)]
    pub accept_agreement: bool,

    /// Disable download progress bars
    #[arg(long)]
    pub no_progress: bool,
}
