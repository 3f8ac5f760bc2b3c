use std::process::ExitCode;

use anyhow::Result;
use args::Cli;
use clap::Parser;
use console::style;
use tracing::debug;

use crate::{commands::command_from_args, config::Settings, dependencies::TokioFs};

mod args;
mod catalog;
mod commands;
mod config;
mod deploy;
mod dependencies;
mod error;
mod formatting;
mod interaction;
mod logging;
mod models;
mod resolvers;
mod table;
mod template;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::setup_logging(cli.global_args.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{} {error:#}", style("Error:").red().bold().for_stderr());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(&cli.global_args, &TokioFs::new()).await?;
    debug!(
        endpoint = %settings.endpoint,
        subscription = %settings.subscription_id,
        "settings loaded"
    );

    let format = cli.global_args.format.unwrap_or_default();
    let mut command = command_from_args(cli.command, &settings, format).await?;
    command.execute().await
}
