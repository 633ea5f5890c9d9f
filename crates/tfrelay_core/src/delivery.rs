//! Callback delivery of asynchronous outcomes.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::{DeliveryError, DeliveryResult};
use crate::models::ExecutionOutcome;
use crate::store::ResultStore;

/// What happened to an outcome handed to [`ResultDelivery::deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// The callback accepted it
    Delivered,
    /// The callback failed and the outcome was stored for retrieval
    Persisted,
    /// Both the callback and the store failed
    Lost,
}

/// POSTs outcomes to callbacks, falling back to the [`ResultStore`].
pub struct ResultDelivery {
    client: reqwest::Client,
    store: Arc<ResultStore>,
}

impl ResultDelivery {
    pub fn new(store: Arc<ResultStore>, timeout: Duration) -> Self {
        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => {
                warn!(
                    error = %e,
                    timeout_secs = timeout.as_secs(),
                    "Cannot build callback client, using defaults without a timeout"
                );
                reqwest::Client::new()
            }
        };
        Self { client, store }
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    /// One POST attempt; any non-2xx answer counts as failure.
    pub async fn post(&self, outcome: &ExecutionOutcome, url: &str) -> DeliveryResult<()> {
        let response = self.client.post(url).json(outcome).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Rejected {
                url: url.to_string(),
                status: status.as_u16(),
            })
        }
    }

    /// Deliver once, persisting the outcome if the callback fails.
    pub async fn deliver(&self, outcome: &ExecutionOutcome, url: &str) -> DeliveryStatus {
        match self.post(outcome, url).await {
            Ok(()) => {
                info!(url, "Result delivered to callback");
                DeliveryStatus::Delivered
            }
            Err(e) => {
                warn!(url, error = %e, "Callback failed, persisting result");
                match self.store.persist(outcome) {
                    Ok(_) => DeliveryStatus::Persisted,
                    Err(e) => {
                        error!(error = %e, "Failed to persist result, it is lost");
                        DeliveryStatus::Lost
                    }
                }
            }
        }
    }
}
