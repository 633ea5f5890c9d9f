//! The service graph shared by every command.

use std::sync::Arc;

use tfrelay_core::{
    AsyncDispatcher, RequestService, ResultDelivery, ResultStore, ServiceConfig, WorkspaceManager,
};
use tfrelay_runner::{ProcessRunner, ToolRunner};
use tracing::debug;

pub struct ServiceContext {
    pub config: Arc<ServiceConfig>,
    pub service: Arc<RequestService>,
    pub store: Arc<ResultStore>,
    pub dispatcher: Arc<AsyncDispatcher>,
}

impl ServiceContext {
    /// Wire the service against real subprocesses.
    pub fn from_config(config: ServiceConfig) -> Self {
        Self::with_runner(config, Arc::new(ProcessRunner::new()))
    }

    pub fn with_runner(config: ServiceConfig, runner: Arc<dyn ToolRunner>) -> Self {
        let config = Arc::new(config);
        debug!(
            workspace_root = %config.workspace_root.display(),
            result_store_root = %config.result_store_root.display(),
            "Building service"
        );

        let resolver = Arc::new(config.tool.build_resolver(runner.clone()));
        let service = Arc::new(RequestService::new(config.clone(), runner, resolver));
        let store = Arc::new(ResultStore::new(
            &config.result_store_root,
            WorkspaceManager::new(&config.workspace_root),
            config.clean_workspace_after_deployment,
        ));
        let delivery = Arc::new(ResultDelivery::new(store.clone(), config.callback_timeout()));
        let dispatcher = Arc::new(AsyncDispatcher::new(
            service.clone(),
            delivery,
            config.max_concurrent_tasks,
        ));

        Self {
            config,
            service,
            store,
            dispatcher,
        }
    }
}
