#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tfrelay_core::{
    AsyncDispatcher, ExecutionRequest, RequestService, RequestType, ResultDelivery, ResultStore,
    ScriptSource, ServiceConfig, WorkspaceManager,
};
use tfrelay_runner::{MockResponse, MockRunner, ToolRunner};

pub const VALID_REPORT: &str =
    r#"{"format_version":"1.0","valid":true,"error_count":0,"warning_count":0,"diagnostics":[]}"#;

pub struct Harness {
    pub temp: TempDir,
    pub config: Arc<ServiceConfig>,
    pub runner: MockRunner,
    pub service: Arc<RequestService>,
}

impl Harness {
    pub fn new(runner: MockRunner) -> Self {
        Self::with_config(runner, |_| {})
    }

    pub fn with_config(runner: MockRunner, adjust: impl FnOnce(&mut ServiceConfig)) -> Self {
        let temp = TempDir::new().unwrap();
        let mut config = ServiceConfig::rooted_at(temp.path());
        config.tool.default_versions_only = true;
        adjust(&mut config);
        let config = Arc::new(config);

        let runner = runner.on_subcommand(
            "version",
            MockResponse::success(r#"{"terraform_version":"1.9.0"}"#),
        );
        let dyn_runner: Arc<dyn ToolRunner> = Arc::new(runner.clone());
        let resolver = Arc::new(config.tool.build_resolver(dyn_runner.clone()));
        let service = Arc::new(RequestService::new(config.clone(), dyn_runner, resolver));

        Self {
            temp,
            config,
            runner,
            service,
        }
    }

    /// Put a fake executable where the installer would, so constraints
    /// resolve without a download.
    pub fn preinstall(&self, version: &str) {
        let dir = self.config.tool.install_dir.join(version);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("terraform"), "").unwrap();
    }

    pub fn store(&self) -> Arc<ResultStore> {
        Arc::new(ResultStore::new(
            &self.config.result_store_root,
            WorkspaceManager::new(&self.config.workspace_root),
            self.config.clean_workspace_after_deployment,
        ))
    }

    pub fn dispatcher(&self, store: Arc<ResultStore>) -> AsyncDispatcher {
        let delivery = Arc::new(ResultDelivery::new(store, Duration::from_secs(5)));
        AsyncDispatcher::new(self.service.clone(), delivery, 2)
    }
}

pub fn inline(request_type: RequestType, files: &[(&str, &str)]) -> ExecutionRequest {
    let files: BTreeMap<String, String> = files
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    ExecutionRequest::new(request_type, ScriptSource::Inline(files))
}
