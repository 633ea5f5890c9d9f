//! Sources of available terraform release versions.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use semver::Version;
use serde::Deserialize;
use tracing::debug;

use crate::constraint::parse_version_tag;
use crate::error::{ToolError, ToolResult};

/// Lists the terraform versions that can be installed.
#[async_trait]
pub trait VersionSource: Send + Sync {
    async fn fetch_versions(&self) -> ToolResult<BTreeSet<Version>>;
}

/// A fixed list of versions. Used when remote lookup is disabled and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticVersionSource {
    versions: BTreeSet<Version>,
}

impl StaticVersionSource {
    pub fn new(versions: impl IntoIterator<Item = Version>) -> Self {
        Self {
            versions: versions.into_iter().collect(),
        }
    }

    /// Build from tag strings, skipping anything that is not a release version.
    pub fn parse<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(tags.into_iter().filter_map(|t| parse_version_tag(t.as_ref())))
    }
}

#[async_trait]
impl VersionSource for StaticVersionSource {
    async fn fetch_versions(&self) -> ToolResult<BTreeSet<Version>> {
        Ok(self.versions.clone())
    }
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

/// Reads release tags from the GitHub tags API of `hashicorp/terraform`.
pub struct GithubTagsSource {
    api_url: String,
    max_pages: usize,
    client: reqwest::Client,
}

impl GithubTagsSource {
    const PER_PAGE: usize = 100;

    pub fn new(api_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tfrelay/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            api_url: api_url.into(),
            max_pages: 10,
            client,
        }
    }

    pub fn max_pages(mut self, pages: usize) -> Self {
        self.max_pages = pages.max(1);
        self
    }

    async fn fetch_page(&self, page: usize) -> ToolResult<Vec<Tag>> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("per_page", Self::PER_PAGE), ("page", page)])
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Fetch(format!(
                "{} returned {}",
                self.api_url, status
            )));
        }

        Ok(response.json::<Vec<Tag>>().await?)
    }
}

#[async_trait]
impl VersionSource for GithubTagsSource {
    async fn fetch_versions(&self) -> ToolResult<BTreeSet<Version>> {
        let mut versions = BTreeSet::new();

        for page in 1..=self.max_pages {
            let tags = self.fetch_page(page).await?;
            let count = tags.len();
            versions.extend(tags.iter().filter_map(|t| parse_version_tag(&t.name)));

            if count < Self::PER_PAGE {
                break;
            }
        }

        debug!(count = versions.len(), "Fetched terraform release tags");
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_source_skips_prereleases() {
        let source = StaticVersionSource::parse(["v1.7.0", "1.8.0", "v1.9.0-beta1", "main"]);
        let versions = source.fetch_versions().await.unwrap();

        let listed: Vec<String> = versions.iter().map(|v| v.to_string()).collect();
        assert_eq!(listed, vec!["1.7.0", "1.8.0"]);
    }

    #[test]
    fn test_tag_payload_shape() {
        let body = r#"[{"name":"v1.10.0","commit":{"sha":"abc"}},{"name":"v1.9.8"}]"#;
        let tags: Vec<Tag> = serde_json::from_str(body).unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(parse_version_tag(&tags[0].name), Version::parse("1.10.0").ok());
    }
}
