mod cli;
mod commands;
mod config;

use std::{io, process::ExitCode};

use anyhow::Context;
use clap::Parser;
use tracing::debug;

use crate::{
    cli::{Cli, Command},
    config::Settings,
};

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("wardend: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn try_main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let settings = Settings::resolve(&cli)?;
    let mut stdout = io::stdout().lock();

    match cli.command {
        Command::Check { unit } => commands::check(&unit, &mut stdout).map(|_| ExitCode::SUCCESS),
        Command::Render { unit } => commands::render(&unit, &mut stdout).map(|_| ExitCode::SUCCESS),
        Command::Install { unit } => {
            commands::install(&settings, &unit, &mut stdout).map(|_| ExitCode::SUCCESS)
        }
        Command::Enable { unit } => {
            commands::enable(&settings, &unit, &mut stdout).map(|_| ExitCode::SUCCESS)
        }
        Command::Disable { unit } => {
            commands::disable(&settings, &unit, &mut stdout).map(|_| ExitCode::SUCCESS)
        }
        Command::Status { unit } => {
            commands::status(&settings, &unit, &mut stdout).map(|_| ExitCode::SUCCESS)
        }
        Command::Run { unit } => {
            drop(stdout);
            start_logging(&settings)?;
            runtime()?.block_on(commands::run(&settings, &unit))
        }
        Command::Boot { target } => {
            drop(stdout);
            start_logging(&settings)?;
            runtime()?.block_on(commands::boot(&settings, target))
        }
    }
}

// Called before any runtime thread exists so the local UTC offset can be read.
fn start_logging(settings: &Settings) -> anyhow::Result<()> {
    warden_observe::logger_init(&settings.logger).context("initializing logger")?;
    debug!(
        target: "warden::core",
        unit_dir = %settings.unit_dir.display(),
        format = %settings.logger.format,
        "logger ready"
    );
    Ok(())
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("wardend")
        .build()
        .context("building tokio runtime")
}
