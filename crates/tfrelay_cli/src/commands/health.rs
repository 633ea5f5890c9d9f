//! Health command - run the health check once.

use anyhow::Result;
use clap::Args;
use tfrelay_core::{HealthStatus, ServiceConfig};
use uuid::Uuid;

use crate::context::ServiceContext;

#[derive(Args)]
pub struct HealthArgs {
    /// Request id to report under (random when omitted)
    #[arg(long)]
    pub request_id: Option<Uuid>,
}

pub async fn execute(args: HealthArgs, config: ServiceConfig) -> Result<()> {
    let context = ServiceContext::from_config(config);
    let status = context
        .service
        .health_check(args.request_id.unwrap_or_else(Uuid::new_v4))
        .await;

    println!("{}", serde_json::to_string_pretty(&status)?);

    if status.health_status == HealthStatus::Nok {
        anyhow::bail!(
            "Health check failed: {}",
            status.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
