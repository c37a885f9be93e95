use std::process::ExitCode;

use anyhow::{Context, Error};
use clap::Parser;
use log::{error, info};

use sanplan::{
    cli::{Cli, Commands},
    resolve_to, validate, write_error,
};
use sanplan_api::error::{SanplanError, SanplanResultExt};

fn run_sanplan(args: &Cli) -> Result<(), SanplanError> {
    info!("Sanplan version: {}", sanplan::SANPLAN_VERSION);

    match &args.command {
        Commands::Validate { inputs } => validate(inputs),
        Commands::Resolve {
            inputs,
            format,
            outfile,
            error,
        } => {
            let res = resolve_to(inputs, *format, outfile);
            if let (Some(error_path), Err(e)) = (error.as_ref(), &res) {
                write_error(e, error_path);
            }
            res
        }
    }
    .message(format!("Failed to execute '{}' command", args.command))
}

fn setup_logging(args: &Cli) -> Result<(), Error> {
    env_logger::builder()
        .format_timestamp(None)
        .filter_level(args.verbosity)
        .try_init()
        .context("Logger already registered")
}

fn main() -> ExitCode {
    let args = Cli::parse();

    if let Err(e) = setup_logging(&args) {
        eprintln!("Failed to initialize logging: {e:?}");
        return ExitCode::from(1);
    }

    if let Err(e) = run_sanplan(&args) {
        error!("Sanplan failed: {e:?}");
        return ExitCode::from(2);
    }
    ExitCode::SUCCESS
}
