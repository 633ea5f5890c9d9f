//! Run command - execute one request file synchronously.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tfrelay_core::{ExecutionOutcome, ExecutionRequest, ServiceConfig};
use tracing::info;

use crate::context::ServiceContext;

#[derive(Args)]
pub struct RunArgs {
    /// Request JSON, in the same shape the REST surface accepts
    pub request: PathBuf,

    /// Write the outcome here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Exit successfully even when the operation failed
    #[arg(long)]
    pub allow_failure: bool,
}

pub async fn execute(args: RunArgs, config: ServiceConfig) -> Result<()> {
    let request = read_request(&args.request)?;
    let context = ServiceContext::from_config(config);

    let outcome = context
        .service
        .handle(&request)
        .await
        .with_context(|| format!("request {} rejected", request.request_id))?;

    write_outcome(&outcome, args.output.as_deref())?;

    if !outcome.success && !args.allow_failure {
        anyhow::bail!("Request failed: {} {}", outcome.request_type, outcome.request_id);
    }
    info!(request_id = %outcome.request_id, success = outcome.success, "Done");
    Ok(())
}

fn read_request(path: &Path) -> Result<ExecutionRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read request {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("cannot read request {}: invalid JSON", path.display()))
}

fn write_outcome(outcome: &ExecutionOutcome, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(outcome)?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("cannot write {}", path.display())),
        None => {
            println!("{}", json);
            Ok(())
        }
    }
}
