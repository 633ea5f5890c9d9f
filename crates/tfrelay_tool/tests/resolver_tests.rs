//! Resolver behaviour against fake sources and installers.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use semver::Version;
use tempfile::TempDir;
use tfrelay_runner::{MockResponse, MockRunner};
use tfrelay_tool::{
    StaticVersionSource, ToolError, ToolInstaller, ToolResult, VersionCache, VersionResolver,
    VersionSource,
};

/// Writes an empty file per version and counts installs.
struct FakeInstaller {
    root: PathBuf,
    installs: AtomicUsize,
}

impl FakeInstaller {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            installs: AtomicUsize::new(0),
        }
    }

    fn preinstall(&self, version: &str) {
        let path = self.executable_path(&Version::parse(version).unwrap());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }
}

#[async_trait]
impl ToolInstaller for FakeInstaller {
    fn executable_path(&self, version: &Version) -> PathBuf {
        self.root.join(version.to_string()).join("terraform")
    }

    fn installed_versions(&self) -> Vec<Version> {
        std::fs::read_dir(&self.root)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| Version::parse(&e.file_name().to_string_lossy()).ok())
                    .filter(|v| self.is_installed(v))
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn install(&self, version: &Version) -> ToolResult<PathBuf> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let path = self.executable_path(version);
        std::fs::create_dir_all(path.parent().unwrap())?;
        std::fs::write(&path, "")?;
        Ok(path)
    }
}

struct CountingSource {
    inner: StaticVersionSource,
    calls: AtomicUsize,
}

#[async_trait]
impl VersionSource for CountingSource {
    async fn fetch_versions(&self) -> ToolResult<BTreeSet<Version>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_versions().await
    }
}

fn resolver_with(
    installer: Arc<FakeInstaller>,
    source: Arc<dyn VersionSource>,
    runner: MockRunner,
) -> VersionResolver {
    VersionResolver::new(
        "terraform",
        Arc::new(VersionCache::new(Duration::from_secs(3600), [])),
        source,
        installer,
        Arc::new(runner),
    )
}

fn releases() -> Arc<StaticVersionSource> {
    Arc::new(StaticVersionSource::parse([
        "1.6.0", "1.7.0", "1.8.0", "1.9.0", "1.10.0",
    ]))
}

#[tokio::test]
async fn test_exact_constraint_installs_that_version() {
    let temp = TempDir::new().unwrap();
    let installer = Arc::new(FakeInstaller::new(temp.path().to_path_buf()));
    let resolver = resolver_with(installer.clone(), releases(), MockRunner::new());

    let tool = resolver.resolve("= 1.7.0").await.unwrap();

    assert_eq!(tool.version, Some(Version::new(1, 7, 0)));
    assert_eq!(tool.path, temp.path().join("1.7.0").join("terraform"));
    assert!(tool.path.is_file());
    assert_eq!(installer.installs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unsatisfiable_constraint_is_not_found() {
    let temp = TempDir::new().unwrap();
    let installer = Arc::new(FakeInstaller::new(temp.path().to_path_buf()));
    let resolver = resolver_with(installer.clone(), releases(), MockRunner::new());

    let err = resolver.resolve(">= 100.0.0").await.unwrap_err();

    match err {
        ToolError::NotFound { constraint, .. } => assert_eq!(constraint, ">= 100.0.0"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(installer.installs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_installed_versions_are_preferred() {
    let temp = TempDir::new().unwrap();
    let installer = Arc::new(FakeInstaller::new(temp.path().to_path_buf()));
    installer.preinstall("1.9.0");
    let resolver = resolver_with(installer.clone(), releases(), MockRunner::new());

    // 1.7.0 is a closer release, but 1.9.0 is already on disk.
    let tool = resolver.resolve(">= 1.7.0").await.unwrap();

    assert_eq!(tool.version, Some(Version::new(1, 9, 0)));
    assert_eq!(installer.installs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_upper_bound_picks_highest_match() {
    let temp = TempDir::new().unwrap();
    let installer = Arc::new(FakeInstaller::new(temp.path().to_path_buf()));
    let resolver = resolver_with(installer, releases(), MockRunner::new());

    let tool = resolver.resolve("<= v1.8.0").await.unwrap();
    assert_eq!(tool.version, Some(Version::new(1, 8, 0)));
}

#[tokio::test]
async fn test_blank_constraint_uses_default_executable() {
    let temp = TempDir::new().unwrap();
    let installer = Arc::new(FakeInstaller::new(temp.path().to_path_buf()));
    let runner = MockRunner::new().on_subcommand(
        "version",
        MockResponse::success(r#"{"terraform_version":"1.8.5","platform":"linux_amd64"}"#),
    );
    let resolver = resolver_with(installer, releases(), runner.clone());

    let tool = resolver.resolve("  ").await.unwrap();

    assert_eq!(tool.path, PathBuf::from("terraform"));
    assert_eq!(tool.version, Some(Version::new(1, 8, 5)));
    assert_eq!(runner.get_calls()[0].args, vec!["version", "-json"]);
}

#[tokio::test]
async fn test_malformed_constraint_is_rejected() {
    let temp = TempDir::new().unwrap();
    let installer = Arc::new(FakeInstaller::new(temp.path().to_path_buf()));
    let resolver = resolver_with(installer, releases(), MockRunner::new());

    let err = resolver.resolve("~> 1.6").await.unwrap_err();
    assert!(matches!(err, ToolError::InvalidConstraint(_)));
}

#[tokio::test]
async fn test_concurrent_requests_install_once() {
    let temp = TempDir::new().unwrap();
    let installer = Arc::new(FakeInstaller::new(temp.path().to_path_buf()));
    let resolver = Arc::new(resolver_with(installer.clone(), releases(), MockRunner::new()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.resolve("= 1.10.0").await })
        })
        .collect();

    for handle in handles {
        let tool = handle.await.unwrap().unwrap();
        assert_eq!(tool.version, Some(Version::new(1, 10, 0)));
    }
    assert_eq!(installer.installs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cache_miss_triggers_one_refresh() {
    let temp = TempDir::new().unwrap();
    let installer = Arc::new(FakeInstaller::new(temp.path().to_path_buf()));
    let source = Arc::new(CountingSource {
        inner: StaticVersionSource::parse(["1.6.0"]),
        calls: AtomicUsize::new(0),
    });
    let resolver = resolver_with(installer, source.clone(), MockRunner::new());

    assert!(resolver.resolve("= 1.6.0").await.is_ok());
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);

    assert!(resolver.resolve("= 1.9.0").await.is_err());
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_entries_report_install_status() {
    let temp = TempDir::new().unwrap();
    let installer = Arc::new(FakeInstaller::new(temp.path().to_path_buf()));
    installer.preinstall("1.6.0");
    let resolver = resolver_with(installer, releases(), MockRunner::new());
    resolver.resolve("= 1.7.0").await.unwrap();

    let entries = resolver.entries().await;
    let installed: Vec<&str> = entries
        .iter()
        .filter(|e| e.installed)
        .map(|e| e.version.as_str())
        .collect();

    assert_eq!(installed, vec!["1.6.0", "1.7.0"]);
    assert!(entries.iter().any(|e| e.version == "1.10.0" && !e.installed));
}
