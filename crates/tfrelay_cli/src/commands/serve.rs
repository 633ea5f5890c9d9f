//! Serve command - REST surface.
//!
//! Routes, all under `/tfrelay`:
//! - `POST /{source}/{operation}`: run synchronously, answer with the outcome
//! - `POST /{source}/{operation}/async`: accept, deliver to `webhookConfig.url` later
//! - `GET /task/result/{requestId}`: take a stored result
//! - `POST /task/results/batch`: take several stored results
//! - `GET /health`: run the health check
//!
//! `source` is one of `scripts`, `git`, `directory` and must agree with the
//! body; `operation` must agree with its `requestType`.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::Args;
use serde_json::json;
use tfrelay_core::{
    CoreError, ExecutionOutcome, ExecutionRequest, RefetchResult, RequestType, RetrieveError,
    ServiceConfig, SystemStatus,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::ServiceContext;

pub const API_PREFIX: &str = "/tfrelay";

#[derive(Args)]
pub struct ServeArgs {
    /// Address to listen on (overrides `bind_address`)
    #[arg(short, long, env = "TFRELAY_BIND")]
    pub bind: Option<String>,
}

pub async fn execute(args: ServeArgs, config: ServiceConfig) -> Result<()> {
    let bind = args.bind.unwrap_or_else(|| config.bind_address.clone());
    let context = Arc::new(ServiceContext::from_config(config));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("cannot listen on {}", bind))?;
    info!(address = %bind, "REST surface listening");

    axum::serve(listener, router(context))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Shutting down");
        })
        .await
        .context("server error")
}

pub fn router(context: Arc<ServiceContext>) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/task/result/:request_id", get(fetch_result))
        .route("/task/results/batch", post(fetch_batch))
        .route("/:source/:operation", post(run_sync).delete(run_sync))
        .route("/:source/:operation/async", post(run_async).delete(run_async));

    Router::new().nest(API_PREFIX, api).with_state(context)
}

/// An error answered as `{"error": message}`.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        let status = match e {
            CoreError::InvalidRequest(_) | CoreError::InvalidScripts(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Reject bodies sent to the route of another source or operation.
fn check_route(request: &ExecutionRequest, source: &str, operation: &str) -> Result<(), ApiError> {
    if request.source.kind() != source {
        return Err(ApiError::bad_request(format!(
            "route '{}' does not accept a '{}' source",
            source,
            request.source.kind()
        )));
    }
    let operation: RequestType = operation.parse().map_err(ApiError::bad_request)?;
    if operation != request.request_type {
        return Err(ApiError::bad_request(format!(
            "route '{}' does not accept requestType {}",
            operation, request.request_type
        )));
    }
    Ok(())
}

async fn run_sync(
    State(context): State<Arc<ServiceContext>>,
    Path((source, operation)): Path<(String, String)>,
    Json(request): Json<ExecutionRequest>,
) -> Result<Json<ExecutionOutcome>, ApiError> {
    check_route(&request, &source, &operation)?;
    let outcome = context.service.handle(&request).await?;
    Ok(Json(outcome))
}

async fn run_async(
    State(context): State<Arc<ServiceContext>>,
    Path((source, operation)): Path<(String, String)>,
    Json(request): Json<ExecutionRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    check_route(&request, &source, &operation)?;
    let request_id = request.request_id;
    // Detached; the dispatcher owns delivery from here.
    let _ = context.dispatcher.submit(request)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "requestId": request_id }))))
}

async fn fetch_result(
    State(context): State<Arc<ServiceContext>>,
    Path(request_id): Path<Uuid>,
) -> Response {
    match context.store.retrieve(request_id) {
        Ok(outcome) => Json(outcome).into_response(),
        Err(RetrieveError::InProgress(_)) => StatusCode::NO_CONTENT.into_response(),
        Err(e @ RetrieveError::NotFound(_)) => ApiError {
            status: StatusCode::NOT_FOUND,
            message: e.to_string(),
        }
        .into_response(),
        Err(e @ RetrieveError::ParseFailed { .. }) => ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        }
        .into_response(),
    }
}

async fn fetch_batch(
    State(context): State<Arc<ServiceContext>>,
    Json(request_ids): Json<Vec<Uuid>>,
) -> Result<Json<Vec<RefetchResult>>, ApiError> {
    if request_ids.is_empty() {
        return Err(ApiError::bad_request("requestIds cannot be empty"));
    }
    Ok(Json(context.store.retrieve_batch(&request_ids)))
}

async fn health(State(context): State<Arc<ServiceContext>>) -> Json<SystemStatus> {
    Json(context.service.health_check(Uuid::new_v4()).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::{mock_context, MAIN_TF};
    use serde_json::Value;
    use std::time::Duration;
    use tempfile::TempDir;
    use tfrelay_core::{HealthStatus, RefetchState};
    use tfrelay_runner::{MockResponse, MockRunner};

    async fn spawn_server(runner: MockRunner) -> (TempDir, String) {
        let temp = TempDir::new().unwrap();
        let context = Arc::new(mock_context(temp.path(), runner));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router(context)).await;
        });
        (temp, format!("http://{}{}", addr, API_PREFIX))
    }

    fn scripts_body(request_type: &str) -> Value {
        json!({
            "requestId": Uuid::new_v4(),
            "requestType": request_type,
            "scriptFiles": { "main.tf": MAIN_TF }
        })
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (_temp, base) = spawn_server(MockRunner::new()).await;

        let status: SystemStatus = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(status.health_status, HealthStatus::Ok);
        assert_eq!(status.service_type, "tfrelay");
    }

    #[tokio::test]
    async fn test_sync_plan_returns_outcome() {
        let runner = MockRunner::new()
            .on_subcommand("show", MockResponse::success(r#"{"format_version":"1.2"}"#));
        let (_temp, base) = spawn_server(runner).await;
        let body = scripts_body("PLAN");

        let response = reqwest::Client::new()
            .post(format!("{}/scripts/plan", base))
            .json(&body)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let outcome: ExecutionOutcome = response.json().await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.request_id.to_string(), body["requestId"].as_str().unwrap());
        assert!(outcome.plan.is_some());
    }

    #[tokio::test]
    async fn test_route_must_match_body() {
        let (_temp, base) = spawn_server(MockRunner::new()).await;
        let client = reqwest::Client::new();

        let wrong_source = client
            .post(format!("{}/git/plan", base))
            .json(&scripts_body("PLAN"))
            .send()
            .await
            .unwrap();
        assert_eq!(wrong_source.status(), reqwest::StatusCode::BAD_REQUEST);

        let wrong_operation = client
            .post(format!("{}/scripts/deploy", base))
            .json(&scripts_body("PLAN"))
            .send()
            .await
            .unwrap();
        assert_eq!(wrong_operation.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_destroy_without_state_is_bad_request() {
        let (_temp, base) = spawn_server(MockRunner::new()).await;

        let response = reqwest::Client::new()
            .delete(format!("{}/scripts/destroy", base))
            .json(&scripts_body("DESTROY"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("state"));
    }

    #[tokio::test]
    async fn test_sync_rejects_webhook() {
        let (_temp, base) = spawn_server(MockRunner::new()).await;
        let mut body = scripts_body("DEPLOY");
        body["webhookConfig"] = json!({ "url": "http://127.0.0.1:1/callback" });

        let response = reqwest::Client::new()
            .post(format!("{}/scripts/deploy", base))
            .json(&body)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("webhookConfig"));
    }

    #[tokio::test]
    async fn test_async_requires_webhook() {
        let (_temp, base) = spawn_server(MockRunner::new()).await;

        let response = reqwest::Client::new()
            .post(format!("{}/scripts/deploy/async", base))
            .json(&scripts_body("DEPLOY"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_async_result_recovered_after_failed_callback() {
        let (_temp, base) = spawn_server(MockRunner::new()).await;
        let client = reqwest::Client::new();
        let mut body = scripts_body("DEPLOY");
        body["webhookConfig"] = json!({ "url": "http://127.0.0.1:1/callback" });
        let id = body["requestId"].as_str().unwrap().to_string();

        let accepted = client
            .post(format!("{}/scripts/deploy/async", base))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(accepted.status(), reqwest::StatusCode::ACCEPTED);

        let mut fetched = None;
        for _ in 0..100 {
            let response = client
                .get(format!("{}/task/result/{}", base, id))
                .send()
                .await
                .unwrap();
            if response.status() == reqwest::StatusCode::OK {
                fetched = Some(response.json::<ExecutionOutcome>().await.unwrap());
                break;
            }
            assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let outcome = fetched.expect("result was never stored");
        assert_eq!(outcome.request_id.to_string(), id);

        let again = client
            .get(format!("{}/task/result/{}", base, id))
            .send()
            .await
            .unwrap();
        assert_eq!(again.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_batch_fetch() {
        let (_temp, base) = spawn_server(MockRunner::new()).await;
        let client = reqwest::Client::new();
        let id = Uuid::new_v4();

        let results: Vec<RefetchResult> = client
            .post(format!("{}/task/results/batch", base))
            .json(&vec![id])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].state, RefetchState::NotFound);

        let empty = client
            .post(format!("{}/task/results/batch", base))
            .json(&Vec::<Uuid>::new())
            .send()
            .await
            .unwrap();
        assert_eq!(empty.status(), reqwest::StatusCode::BAD_REQUEST);
    }
}
