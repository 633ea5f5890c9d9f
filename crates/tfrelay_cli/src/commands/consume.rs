//! Consume command - queue surface over stdio.
//!
//! Each input line is one [`Envelope`] (`{"routingKey": ..., "payload": ...}`).
//! Each result is written as one envelope line on the output, keyed by the
//! result routing key. A broker bridge only has to move lines.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tfrelay_core::{ChannelPublisher, Envelope, QueueConsumer, ServiceConfig, EXCHANGE};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::context::ServiceContext;

#[derive(Args)]
pub struct ConsumeArgs {
    /// Read messages from this file instead of stdin
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Append results to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Counters reported when the input ends.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsumeStats {
    pub handled: usize,
    pub rejected: usize,
    pub failed: usize,
}

pub async fn execute(args: ConsumeArgs, config: ServiceConfig) -> Result<()> {
    let context = ServiceContext::from_config(config);
    info!(exchange = EXCHANGE, "Consuming queue messages");

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("cannot open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let stats = match &args.output {
        Some(path) => {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .with_context(|| format!("cannot open {}", path.display()))?;
            pump(&context, reader, &mut file).await?
        }
        None => pump(&context, reader, &mut tokio::io::stdout()).await?,
    };

    info!(
        handled = stats.handled,
        rejected = stats.rejected,
        failed = stats.failed,
        "Input exhausted"
    );
    Ok(())
}

/// Handle every message from `reader`, at most `max_concurrent_tasks` at a
/// time, writing results to `writer` as they are published.
pub async fn pump<R, W>(context: &ServiceContext, reader: R, writer: &mut W) -> Result<ConsumeStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (publisher, mut results) = ChannelPublisher::channel();
    let consumer = Arc::new(QueueConsumer::new(context.service.clone(), Arc::new(publisher)));
    let permits = Arc::new(Semaphore::new(context.config.max_concurrent_tasks.max(1)));

    let read = async move {
        let mut stats = ConsumeStats::default();
        let mut tasks = JoinSet::new();
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let envelope: Envelope = match serde_json::from_str(&line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable message");
                    stats.rejected += 1;
                    continue;
                }
            };

            let permit = permits.clone().acquire_owned().await?;
            let consumer = consumer.clone();
            tasks.spawn(async move {
                let _permit = permit;
                consumer.handle(envelope).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => stats.handled += 1,
                Ok(Err(e)) => {
                    error!(error = %e, "Message not handled");
                    stats.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "Message task panicked");
                    stats.failed += 1;
                }
            }
        }

        // Closes the result channel once the last publisher is gone.
        drop(consumer);
        Ok::<_, anyhow::Error>(stats)
    };

    let write = async {
        while let Some(envelope) = results.recv().await {
            let mut line = serde_json::to_vec(&envelope)?;
            line.push(b'\n');
            writer.write_all(&line).await?;
            writer.flush().await?;
        }
        Ok::<_, anyhow::Error>(())
    };

    let (stats, written) = tokio::join!(read, write);
    written.context("cannot write results")?;
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::{mock_context, MAIN_TF};
    use serde_json::json;
    use tempfile::TempDir;
    use tfrelay_core::queue::routing;
    use tfrelay_core::{ExecutionOutcome, SystemStatus};
    use tfrelay_runner::{MockResponse, MockRunner};
    use uuid::Uuid;

    fn output_envelopes(out: &[u8]) -> Vec<Envelope> {
        String::from_utf8_lossy(out)
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_messages_are_answered_line_by_line() {
        let temp = TempDir::new().unwrap();
        let runner = MockRunner::new()
            .on_subcommand("show", MockResponse::success(r#"{"format_version":"1.2"}"#));
        let context = mock_context(temp.path(), runner);
        let plan_id = Uuid::new_v4();
        let health_id = Uuid::new_v4();
        let input = format!(
            "{}\n\nnot json\n{}\n",
            json!({
                "routingKey": routing::SCRIPTS_REQUEST,
                "payload": {
                    "requestId": plan_id,
                    "requestType": "PLAN",
                    "scriptFiles": { "main.tf": MAIN_TF }
                }
            }),
            json!({
                "routingKey": routing::HEALTH_CHECK_REQUEST,
                "payload": { "requestId": health_id }
            }),
        );
        let mut out = Vec::new();

        let stats = pump(&context, input.as_bytes(), &mut out).await.unwrap();

        assert_eq!(
            stats,
            ConsumeStats {
                handled: 2,
                rejected: 1,
                failed: 0
            }
        );
        let envelopes = output_envelopes(&out);
        assert_eq!(envelopes.len(), 2);

        let plan = envelopes
            .iter()
            .find(|e| e.routing_key == routing::PLAN_RESULT)
            .unwrap();
        let outcome: ExecutionOutcome = serde_json::from_value(plan.payload.clone()).unwrap();
        assert_eq!(outcome.request_id, plan_id);
        assert!(outcome.success);

        let health = envelopes
            .iter()
            .find(|e| e.routing_key == routing::HEALTH_CHECK_RESULT)
            .unwrap();
        let status: SystemStatus = serde_json::from_value(health.payload.clone()).unwrap();
        assert_eq!(status.request_id, health_id);
    }

    #[tokio::test]
    async fn test_unroutable_message_counts_as_failed() {
        let temp = TempDir::new().unwrap();
        let context = mock_context(temp.path(), MockRunner::new());
        let input = json!({ "routingKey": "request.unknown", "payload": {} }).to_string();
        let mut out = Vec::new();

        let stats = pump(&context, input.as_bytes(), &mut out).await.unwrap();

        assert_eq!(stats.failed, 1);
        assert!(out.is_empty());
    }
}
