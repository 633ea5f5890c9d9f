//! Bounded background execution of asynchronous requests.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};

use crate::delivery::{DeliveryStatus, ResultDelivery};
use crate::error::{CoreError, CoreResult};
use crate::models::ExecutionRequest;
use crate::orchestrator::{request_span, RequestService};

/// Runs webhook requests on a pool of at most `max_concurrent` tasks.
pub struct AsyncDispatcher {
    service: Arc<RequestService>,
    delivery: Arc<ResultDelivery>,
    permits: Arc<Semaphore>,
}

impl AsyncDispatcher {
    pub fn new(
        service: Arc<RequestService>,
        delivery: Arc<ResultDelivery>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            service,
            delivery,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Validate and enqueue. Returns as soon as the request is accepted.
    ///
    /// The workspace directory is created before returning so the request
    /// reports as in progress until its result is delivered or stored.
    pub fn submit(&self, request: ExecutionRequest) -> CoreResult<JoinHandle<DeliveryStatus>> {
        let span = request_span(&request);
        let callback = span.in_scope(|| -> CoreResult<_> {
            self.service.validate_request(&request)?;
            let callback = request.callback.clone().ok_or_else(|| {
                CoreError::InvalidRequest("webhookConfig is required".to_string())
            })?;
            self.service.workspaces().reserve(request.request_id)?;
            Ok(callback)
        })?;

        let service = self.service.clone();
        let delivery = self.delivery.clone();
        let permits = self.permits.clone();

        let task = async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(e) => {
                    warn!(error = %e, "Worker pool closed, running without a permit");
                    None
                }
            };
            debug!("Worker started");

            let (outcome, workspace) = service.execute(&request).await;
            let status = delivery.deliver(&outcome, &callback.url).await;

            if let Some(ws) = workspace {
                service.cleanup(&ws);
            }
            status
        };

        Ok(tokio::spawn(task.instrument(span)))
    }
}
