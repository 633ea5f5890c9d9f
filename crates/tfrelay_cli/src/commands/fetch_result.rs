//! Fetch-result command - take stored results from the result store.
//!
//! Reads the store directly, so it works while no server is running. Taking
//! a result deletes it.

use anyhow::Result;
use clap::Args;
use tfrelay_core::{RefetchState, ServiceConfig};
use uuid::Uuid;

use crate::context::ServiceContext;

#[derive(Args)]
pub struct FetchResultArgs {
    /// Request ids to fetch
    #[arg(required = true)]
    pub request_ids: Vec<Uuid>,
}

pub async fn execute(args: FetchResultArgs, config: ServiceConfig) -> Result<()> {
    let context = ServiceContext::from_config(config);
    let results = context.store.retrieve_batch(&args.request_ids);

    println!("{}", serde_json::to_string_pretty(&results)?);

    let missing = results
        .iter()
        .filter(|r| r.state != RefetchState::Ok)
        .count();
    if missing > 0 {
        anyhow::bail!("{} of {} results not available", missing, results.len());
    }
    Ok(())
}
