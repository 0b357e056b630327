//! `provision` binary: parse the command line and dispatch to a subcommand.
use std::sync::Arc;

use anyhow::Result;
use clap::{CommandFactory, Parser};

use provision_cli::cli::{self, Cli};
use provision_cli::commands;
use provision_cli::error::ProvisionError;
use provision_cli::logging::{self, Logger};

/// Exit status when the installation agreement is declined.
const DECLINED_EXIT_CODE: i32 = 2;

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = Cli::parse();

    match args.command {
        cli::Command::Build(opts) => {
            logging::init_subscriber(args.verbose, "build");
            let log = Arc::new(Logger::new("build"));
            match commands::build::run(&args.global, &opts, &log) {
                Err(e)
                    if matches!(
                        e.downcast_ref::<ProvisionError>(),
                        Some(ProvisionError::Agreement(_))
                    ) =>
                {
                    log.error(&e.to_string());
                    std::process::exit(DECLINED_EXIT_CODE);
                }
                other => other,
            }
        }
        cli::Command::Completions { shell } => {
            let mut command = Cli::command();
            let name = command.get_name().to_string();
            clap_complete::generate(shell, &mut command, name, &mut std::io::stdout());
            Ok(())
        }
        #[allow(clippy::print_stdout)]
        cli::Command::Version => {
            let version = option_env!("PROVISION_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
            println!("provision {version}");
            Ok(())
        }
    }
}
