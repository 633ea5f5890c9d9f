//! Message queue surface.
//!
//! Requests and results travel as JSON payloads tagged with a routing key on
//! a single direct exchange. The broker connection itself lives behind
//! [`MessagePublisher`]; [`ChannelPublisher`] is an in-process implementation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::models::{ExecutionOutcome, ExecutionRequest, RequestType};
use crate::orchestrator::{request_span, RequestService};

pub const EXCHANGE: &str = "terraform.direct.exchange";

pub mod routing {
    pub const HEALTH_CHECK_REQUEST: &str = "request.health-check";
    pub const DIRECTORY_REQUEST: &str = "request.directory";
    pub const GIT_REQUEST: &str = "request.git";
    pub const SCRIPTS_REQUEST: &str = "request.scripts";

    pub const HEALTH_CHECK_RESULT: &str = "result.health-check";
    pub const PLAN_RESULT: &str = "result.plan";
    pub const VALIDATION_RESULT: &str = "result.validation";
    pub const DEPLOYMENT_RESULT: &str = "result.deployment";
}

/// Routing key a result of `request_type` is published on.
pub fn result_routing_key(request_type: RequestType) -> &'static str {
    match request_type {
        RequestType::Validate => routing::VALIDATION_RESULT,
        RequestType::Plan => routing::PLAN_RESULT,
        RequestType::Deploy | RequestType::Modify | RequestType::Destroy => {
            routing::DEPLOYMENT_RESULT
        }
    }
}

/// A message with its routing key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub routing_key: String,
    pub payload: Value,
}

impl Envelope {
    pub fn new<T: Serialize>(routing_key: &str, payload: &T) -> CoreResult<Self> {
        Ok(Self {
            routing_key: routing_key.to_string(),
            payload: serde_json::to_value(payload)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealthCheckRequest {
    request_id: Uuid,
}

/// Publishes results to the exchange.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, envelope: Envelope) -> CoreResult<()>;
}

/// Publishes into a tokio channel.
#[derive(Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelPublisher {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl MessagePublisher for ChannelPublisher {
    async fn publish(&self, envelope: Envelope) -> CoreResult<()> {
        self.tx
            .send(envelope)
            .map_err(|e| CoreError::Publish(e.to_string()))
    }
}

/// Handles request messages and publishes their results.
pub struct QueueConsumer {
    service: Arc<RequestService>,
    publisher: Arc<dyn MessagePublisher>,
}

impl QueueConsumer {
    pub fn new(service: Arc<RequestService>, publisher: Arc<dyn MessagePublisher>) -> Self {
        Self { service, publisher }
    }

    /// Process one message.
    ///
    /// Errors only for messages that cannot be decoded or routed; request
    /// failures are published as failed outcomes.
    pub async fn handle(&self, envelope: Envelope) -> CoreResult<()> {
        match envelope.routing_key.as_str() {
            routing::HEALTH_CHECK_REQUEST => {
                let request: HealthCheckRequest = serde_json::from_value(envelope.payload)?;
                let status = self.service.health_check(request.request_id).await;
                self.publisher
                    .publish(Envelope::new(routing::HEALTH_CHECK_RESULT, &status)?)
                    .await
            }
            routing::DIRECTORY_REQUEST | routing::GIT_REQUEST | routing::SCRIPTS_REQUEST => {
                let request: ExecutionRequest = serde_json::from_value(envelope.payload)?;
                let expected = envelope
                    .routing_key
                    .trim_start_matches("request.");
                if request.source.kind() != expected {
                    warn!(
                        routing_key = %envelope.routing_key,
                        source = request.source.kind(),
                        "Routing key does not match script source"
                    );
                }
                let outcome = self.process(&request).await;
                self.publisher
                    .publish(Envelope::new(result_routing_key(outcome.request_type), &outcome)?)
                    .await
            }
            other => {
                error!(routing_key = other, "Unknown routing key");
                Err(CoreError::InvalidRequest(format!(
                    "unknown routing key '{}'",
                    other
                )))
            }
        }
    }

    async fn process(&self, request: &ExecutionRequest) -> ExecutionOutcome {
        let span = request_span(request);
        async {
            info!("Received queued request");
            if let Err(e) = self.service.validate_request(request) {
                warn!(error = %e, "Request rejected");
                return ExecutionOutcome::failure(request, e.to_string());
            }
            let (outcome, workspace) = self.service.execute(request).await;
            if let Some(workspace) = workspace {
                self.service.cleanup(&workspace);
            }
            outcome
        }
        .instrument(span)
        .await
    }
}
