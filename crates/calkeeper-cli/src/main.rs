//! calkeeper CLI entry point.

use std::process::ExitCode;

use calkeeper_cli::cli::{Cli, Command, ConfigAction};
use calkeeper_cli::commands;
use calkeeper_cli::config::{CliConfig, Settings};
use calkeeper_cli::error::{CliError, CliResult};
use calkeeper_core::{TracingConfig, init_tracing};
use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CliConfig::load_from(path),
        None => CliConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let tracing_config = if cli.debug || config.debug {
        TracingConfig::cli_debug()
    } else if cli.is_daemon() {
        TracingConfig::daemon()
    } else if matches!(cli.command, Some(Command::Auth { .. })) {
        TracingConfig::default()
    } else {
        TracingConfig::quiet()
    };
    if let Err(e) = init_tracing(tracing_config).map_err(CliError::from) {
        eprintln!("warning: {}", e);
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: CliConfig) -> CliResult<()> {
    if let Some(Command::Config { action }) = &cli.command {
        let path = cli.config.clone().unwrap_or_else(CliConfig::default_path);
        return match action {
            ConfigAction::Dump => commands::config::dump(&config, &path),
            ConfigAction::Path => commands::config::path(&path),
        };
    }

    let settings = Settings::resolve(cli.overrides(), &config)?;

    match cli.command {
        None | Some(Command::Serve) => commands::serve::run(&settings).await,
        Some(Command::Auth { force }) => commands::auth::auth(&settings, force).await,
        Some(Command::Status) => commands::auth::status(&settings),
        Some(Command::Token) => commands::token::token(&settings).await,
        Some(Command::Check { tool }) => commands::token::check(&settings, &tool).await,
        Some(Command::Logout) => commands::auth::logout(&settings),
        Some(Command::Config { .. }) => Ok(()),
    }
}
