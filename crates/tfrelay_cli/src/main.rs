//! tfrelay CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Request failure (the operation ran and failed, or was rejected)
//! - 4: Configuration error
//! - 5: Result not available

use std::process::ExitCode;

use clap::Parser;
use tfrelay_core::{CoreError, RetrieveError, ServiceConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod context;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const REQUEST_FAILURE: u8 = 3;
    pub const CONFIG_ERROR: u8 = 4;
    pub const RESULT_UNAVAILABLE: u8 = 5;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = match ServiceConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(ExitCodes::CONFIG_ERROR);
        }
    };

    let result = match cli.command {
        Commands::Serve(args) => commands::serve::execute(args, config).await,
        Commands::Consume(args) => commands::consume::execute(args, config).await,
        Commands::Run(args) => commands::run::execute(args, config).await,
        Commands::FetchResult(args) => commands::fetch_result::execute(args, config).await,
        Commands::Health(args) => commands::health::execute(args, config).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Logs go to stderr; stdout carries results.
fn init_logging(cli: &Cli) {
    let default_directive = if cli.verbose {
        "tfrelay=debug,warn"
    } else if cli.quiet {
        "tfrelay=warn,warn"
    } else {
        "tfrelay=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let registry = tracing_subscriber::registry().with(filter);

    let log_result = if cli.log_json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    if log_result.is_err() {
        // Logging already initialized, continue
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if let Some(core) = e.downcast_ref::<CoreError>() {
        return match core {
            CoreError::InvalidRequest(_) | CoreError::InvalidScripts(_) => {
                ExitCodes::REQUEST_FAILURE
            }
            CoreError::Config(_) => ExitCodes::CONFIG_ERROR,
            _ => ExitCodes::GENERAL_ERROR,
        };
    }
    if e.downcast_ref::<RetrieveError>().is_some() {
        return ExitCodes::RESULT_UNAVAILABLE;
    }

    let msg = e.to_string().to_lowercase();
    if msg.contains("request failed") || msg.contains("health check failed") {
        ExitCodes::REQUEST_FAILURE
    } else if msg.contains("not available") {
        ExitCodes::RESULT_UNAVAILABLE
    } else if msg.contains("argument") || msg.contains("cannot read request") {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}
