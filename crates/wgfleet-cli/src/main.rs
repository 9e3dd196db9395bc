//! wgfleet CLI binary entrypoint.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use wgfleet_cli::cli::{Cli, Commands};
use wgfleet_cli::commands::{
    AllocateCommand, InitCommand, ListCommand, PoolsCommand, ReserveCommand,
};
use wgfleet_cli::output::OutputFormat;
use wgfleet_cli::{CliError, StateContext};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            if let Some(hint) = e.hint() {
                eprintln!("Hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let ctx = StateContext::from_cli(&cli)?;
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    match &cli.command {
        Commands::Init { force } => {
            InitCommand::new(&ctx).execute(&mut stdout, &format, *force)?;
        }
        Commands::Pools => PoolsCommand::new(&ctx).pools(&mut stdout, &format)?,
        Commands::Stats => PoolsCommand::new(&ctx).stats(&mut stdout, &format)?,
        Commands::Allocate(args) => {
            AllocateCommand::new(&ctx).allocate(&mut stdout, &format, args)?;
        }
        Commands::Lookup {
            category,
            requester_type,
            requester_id,
        } => {
            AllocateCommand::new(&ctx).lookup(
                &mut stdout,
                &format,
                *category,
                requester_type,
                requester_id,
            )?;
        }
        Commands::Reserve(args) => {
            ReserveCommand::new(&ctx).reserve(&mut stdout, &format, args)?;
        }
        Commands::Release {
            pool_id,
            requester_type,
            requester_id,
        } => {
            ReserveCommand::new(&ctx).release(
                &mut stdout,
                &format,
                pool_id,
                requester_type,
                requester_id,
            )?;
        }
        Commands::ReleaseRequester {
            requester_type,
            requester_id,
        } => {
            ReserveCommand::new(&ctx).release_requester(
                &mut stdout,
                &format,
                requester_type,
                requester_id,
            )?;
        }
        Commands::List(args) => ListCommand::new(&ctx).execute(&mut stdout, &format, args)?,
    }

    Ok(())
}
