//! # fw-sync
//!
//! Configuration-driven batch tools for keeping a device fleet's firmware
//! and supporting repositories up to date:
//!
//! - **`fw-download`** resolves device/firmware/version requests against a
//!   remote JSON catalog and downloads the binaries, and fetches matching
//!   assets from GitHub's latest releases.
//! - **`repo-sync`** clones or fast-forwards a set of git repositories and
//!   optionally mirrors selected files into a destination tree via rsync.
//!
//! Both tools run to completion once per invocation: configuration is read,
//! every entry is driven to a terminal success or failure outcome, and a
//! summary report decides the process exit code. External collaborators
//! (git, rsync) sit behind narrow traits so the orchestration logic is
//! testable without spawning real processes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use fw_sync::{Catalog, Fetcher, FirmwareConfig, run_firmware_batch};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FirmwareConfig::load(Path::new("firmware.toml"))?;
//!     let fetcher = Fetcher::new(&config.settings)?;
//!     let catalog = Catalog::fetch(fetcher.client(), &config.settings.catalog_url).await?;
//!
//!     let report = run_firmware_batch(
//!         &fetcher,
//!         &catalog,
//!         &config.requests(),
//!         &config.settings.firmware_base_url,
//!     )
//!     .await;
//!     std::process::exit(report.exit_code());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Batch execution and result aggregation
pub mod batch;
/// Remote firmware catalog and version resolution
pub mod catalog;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Streaming asset fetcher
pub mod fetch;
/// GitHub release asset matching
pub mod github;
/// File mirroring via an external copy tool
pub mod mirror;
/// Repository synchronization via an external version-control tool
pub mod sync;

// Re-export commonly used types
pub use batch::{
    BatchReport, Operation, Outcome, RepoBatch, run_firmware_batch, run_github_batch,
};
pub use catalog::{Catalog, CatalogEntry, FirmwareVersion, VersionSelector};
pub use config::{
    DeviceConfig, FirmwareConfig, FirmwareRequest, FirmwareSettings, FirmwareSpec,
    GithubReleaseEntry, RepoConfig, RepoSettings, RepositoryEntry,
};
pub use error::{Error, Result};
pub use fetch::{DownloadStatus, Fetcher, firmware_filename};
pub use github::{Release, ReleaseAsset, fetch_latest_release, releases_api_url};
pub use mirror::{FileCopier, MirrorPlan, RsyncCli, mirror_repository, mirror_tree, plan_mirror};
pub use sync::{GitCli, VersionControl, sync_repository};
