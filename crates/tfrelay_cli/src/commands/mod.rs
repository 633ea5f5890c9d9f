//! CLI command definitions.
//!
//! `serve` and `consume` are the two long-running transports; the remaining
//! commands are one-shot helpers for operators and CI jobs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod consume;
pub mod fetch_result;
pub mod health;
pub mod run;
pub mod serve;

/// tfrelay - terraform as a service
#[derive(Parser)]
#[command(name = "tfrelay")]
#[command(version, about = "tfrelay - terraform as a service")]
#[command(long_about = r#"
tfrelay runs terraform validate/plan/deploy/modify/destroy requests on behalf
of remote callers. Scripts arrive inline, as a git repository, or as a
directory on this host.

COMMANDS:
  serve         → REST surface (synchronous and callback-based endpoints)
  consume       → Queue surface over line-delimited JSON on stdin/stdout
  run           → Execute one request file and print the outcome
  fetch-result  → Take stored results whose callback failed
  health        → Run the health check once

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Request failure
  4 - Configuration error
  5 - Result not available
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (TOML); defaults apply when omitted
    #[arg(short, long, global = true, env = "TFRELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "TFRELAY_LOG_JSON")]
    pub log_json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the REST API
    Serve(serve::ServeArgs),

    /// Consume queue messages from stdin and publish results to stdout
    Consume(consume::ConsumeArgs),

    /// Execute a single request file synchronously
    Run(run::RunArgs),

    /// Retrieve stored results by request id
    #[command(name = "fetch-result")]
    FetchResult(fetch_result::FetchResultArgs),

    /// Check that terraform can validate a trivial configuration
    Health(health::HealthArgs),
}
