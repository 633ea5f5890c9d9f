//! Cached list of installable versions.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use semver::Version;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::source::VersionSource;

/// One known version and whether it is present on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionCacheEntry {
    pub version: String,
    pub installed: bool,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct CacheState {
    versions: BTreeSet<Version>,
    refreshed_at: Option<Instant>,
}

/// Versions known to be installable, refreshed from a [`VersionSource`]
/// when older than the TTL.
///
/// Configured default versions are always part of the list, so a failed
/// remote lookup never leaves the cache empty.
#[derive(Debug)]
pub struct VersionCache {
    ttl: Duration,
    defaults: BTreeSet<Version>,
    state: Mutex<CacheState>,
}

impl VersionCache {
    pub fn new(ttl: Duration, defaults: impl IntoIterator<Item = Version>) -> Self {
        let defaults: BTreeSet<Version> = defaults.into_iter().collect();
        Self {
            ttl,
            state: Mutex::new(CacheState {
                versions: defaults.clone(),
                refreshed_at: None,
            }),
            defaults,
        }
    }

    pub fn with_ttl_seconds(seconds: u64) -> Self {
        Self::new(Duration::from_secs(seconds), [])
    }

    /// Current versions, refreshing first if the TTL has expired.
    pub async fn versions(&self, source: &dyn VersionSource) -> BTreeSet<Version> {
        let mut state = self.state.lock().await;
        let stale = state
            .refreshed_at
            .map_or(true, |at| at.elapsed() >= self.ttl);
        if stale {
            self.refresh_locked(&mut state, source).await;
        }
        state.versions.clone()
    }

    /// Refresh regardless of age. Used on a cache miss.
    pub async fn refresh(&self, source: &dyn VersionSource) -> BTreeSet<Version> {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state, source).await;
        state.versions.clone()
    }

    /// Versions currently held, without touching the source.
    pub async fn snapshot(&self) -> BTreeSet<Version> {
        self.state.lock().await.versions.clone()
    }

    async fn refresh_locked(&self, state: &mut CacheState, source: &dyn VersionSource) {
        match source.fetch_versions().await {
            Ok(fetched) => {
                let mut versions = self.defaults.clone();
                versions.extend(fetched);
                info!(count = versions.len(), "Refreshed terraform version cache");
                state.versions = versions;
            }
            Err(e) => {
                warn!(error = %e, "Version lookup failed, keeping cached versions");
                state.versions.extend(self.defaults.iter().cloned());
            }
        }
        state.refreshed_at = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ToolError, ToolResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl VersionSource for CountingSource {
        async fn fetch_versions(&self) -> ToolResult<BTreeSet<Version>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ToolError::Fetch("offline".into()));
            }
            Ok([Version::new(1, 9, 0)].into_iter().collect())
        }
    }

    #[tokio::test]
    async fn test_refreshes_once_within_ttl() {
        let cache = VersionCache::new(Duration::from_secs(60), [Version::new(1, 6, 0)]);
        let source = CountingSource {
            calls: AtomicUsize::new(0),
            fail: false,
        };

        let first = cache.versions(&source).await;
        let second = cache.versions(&source).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert!(first.contains(&Version::new(1, 6, 0)));
        assert!(first.contains(&Version::new(1, 9, 0)));
    }

    #[tokio::test]
    async fn test_zero_ttl_always_refreshes() {
        let cache = VersionCache::new(Duration::ZERO, []);
        let source = CountingSource {
            calls: AtomicUsize::new(0),
            fail: false,
        };

        cache.versions(&source).await;
        cache.versions(&source).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_lookup_keeps_defaults() {
        let cache = VersionCache::new(Duration::from_secs(60), [Version::new(1, 7, 0)]);
        let source = CountingSource {
            calls: AtomicUsize::new(0),
            fail: true,
        };

        let versions = cache.versions(&source).await;
        assert_eq!(versions.len(), 1);
        assert!(versions.contains(&Version::new(1, 7, 0)));
    }
}
