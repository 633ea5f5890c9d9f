//! # tfrelay_tool
//!
//! Resolves a terraform version constraint to an executable on disk.
//!
//! Constraints have the form `[=|>=|<=] [v]MAJOR.MINOR.PATCH`. A blank
//! constraint selects the default executable on `PATH`. Otherwise the
//! resolver prefers an already installed version, then consults the version
//! cache (refreshed from the remote registry on expiry or miss) and installs
//! the closest satisfying release exactly once.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tfrelay_runner::ProcessRunner;
//! use tfrelay_tool::{HashicorpInstaller, StaticVersionSource, VersionCache, VersionResolver};
//!
//! # async fn demo() -> Result<(), tfrelay_tool::ToolError> {
//! let source = Arc::new(StaticVersionSource::parse(["1.7.0", "1.8.0"]));
//! let installer = Arc::new(HashicorpInstaller::new(
//!     "/var/lib/tfrelay/terraform",
//!     "https://releases.hashicorp.com/terraform",
//! ));
//! let resolver = VersionResolver::new(
//!     "terraform",
//!     Arc::new(VersionCache::with_ttl_seconds(3600)),
//!     source,
//!     installer,
//!     Arc::new(ProcessRunner::new()),
//! );
//!
//! let tool = resolver.resolve(">= 1.7.0").await?;
//! println!("{} ({:?})", tool.path.display(), tool.version);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod constraint;
pub mod error;
pub mod installer;
pub mod resolver;
pub mod source;

pub use cache::{VersionCache, VersionCacheEntry};
pub use constraint::{parse_version_tag, Operator, VersionConstraint};
pub use error::{ToolError, ToolResult};
pub use installer::{HashicorpInstaller, ToolInstaller};
pub use resolver::{ResolvedTool, VersionResolver};
pub use source::{GithubTagsSource, StaticVersionSource, VersionSource};
