//! Configuration types for fw-sync
//!
//! Two independent TOML documents, one per tool:
//! - [`FirmwareConfig`] drives `fw-download` (catalog settings, per-device
//!   firmware requests, GitHub release entries)
//! - [`RepoConfig`] drives `repo-sync` (sync settings, repository entries)
//!
//! Every optional field has a serde default so a minimal document works out
//! of the box.

use crate::catalog::VersionSelector;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default remote catalog location (M5Stack community firmware index)
fn default_catalog_url() -> String {
    "https://raw.githubusercontent.com/bmorcelli/M5Stack-json-fw/main/script/all_device_firmware.json"
        .to_string()
}

/// Default CDN prefix for catalog download file references
fn default_firmware_base_url() -> String {
    "https://m5burner-cdn.m5stack.com/firmware/".to_string()
}

fn default_output_base_dir() -> PathBuf {
    PathBuf::from("firmware")
}

fn default_download_timeout() -> u64 {
    300
}

fn default_file_pattern() -> String {
    "*.bin".to_string()
}

fn default_version() -> String {
    "latest".to_string()
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_parallel_jobs() -> usize {
    1
}

fn default_rsync_args() -> Vec<String> {
    vec!["-av".to_string()]
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_true() -> bool {
    true
}

/// Download behavior settings for the firmware tool
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FirmwareSettings {
    /// Base directory for downloaded firmware (default: "firmware")
    #[serde(default = "default_output_base_dir")]
    pub output_base_dir: PathBuf,

    /// Overwrite files that already exist at the target path (default: false)
    #[serde(default)]
    pub overwrite_existing: bool,

    /// Per-request timeout in seconds for asset transfers (default: 300)
    #[serde(default = "default_download_timeout")]
    pub download_timeout: u64,

    /// Remote JSON catalog URL
    #[serde(default = "default_catalog_url")]
    pub catalog_url: String,

    /// URL prefix prepended to catalog download file references
    #[serde(default = "default_firmware_base_url")]
    pub firmware_base_url: String,
}

impl Default for FirmwareSettings {
    fn default() -> Self {
        Self {
            output_base_dir: default_output_base_dir(),
            overwrite_existing: false,
            download_timeout: default_download_timeout(),
            catalog_url: default_catalog_url(),
            firmware_base_url: default_firmware_base_url(),
        }
    }
}

/// One requested firmware within a device section
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FirmwareSpec {
    /// Firmware name, matched against catalog entries (case-insensitive,
    /// bidirectional substring)
    pub name: String,

    /// Version selector: "latest", "stable", "all", or an exact substring
    #[serde(default = "default_version")]
    pub version: String,
}

/// Per-device configuration section
///
/// The table key under `[devices]` is the directory-safe device key; the
/// display name is what catalog categories are matched against.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device display name (defaults to the table key when absent)
    #[serde(default)]
    pub device_name: Option<String>,

    /// Firmware requested for this device
    #[serde(default)]
    pub firmware: Vec<FirmwareSpec>,
}

/// One GitHub release source
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GithubReleaseEntry {
    /// Name of this source; also the output subdirectory
    pub name: String,

    /// Releases page URL, e.g. `https://github.com/owner/repo/releases`
    pub releases_url: String,

    /// Glob pattern applied to asset filenames (default: "*.bin")
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,
}

/// Configuration document for the firmware downloader
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FirmwareConfig {
    /// Download behavior settings
    #[serde(default)]
    pub settings: FirmwareSettings,

    /// Device sections keyed by directory-safe device key
    ///
    /// BTreeMap keeps request order deterministic across invocations.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceConfig>,

    /// GitHub release sources
    #[serde(default)]
    pub github_releases: Vec<GithubReleaseEntry>,
}

/// One flattened unit of firmware download work
#[derive(Clone, Debug, PartialEq)]
pub struct FirmwareRequest {
    /// Directory-safe device key (output subdirectory)
    pub device_key: String,

    /// Device display name, matched against catalog categories
    pub device: String,

    /// Requested firmware name
    pub name: String,

    /// Requested version selector
    pub selector: VersionSelector,
}

impl FirmwareRequest {
    /// "name (device)" label used in batch outcomes and summaries
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.device)
    }
}

impl FirmwareConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns a fatal [`Error::Config`] when the file does not exist, and
    /// [`Error::TomlParse`] when it cannot be parsed.
    pub fn load(path: &Path) -> Result<Self> {
        load_toml(path)
    }

    /// Flatten the device-organized sections into an ordered request list
    pub fn requests(&self) -> Vec<FirmwareRequest> {
        self.devices
            .iter()
            .flat_map(|(key, device)| {
                let device_name = device.device_name.clone().unwrap_or_else(|| key.clone());
                device.firmware.iter().map(move |spec| FirmwareRequest {
                    device_key: key.clone(),
                    device: device_name.clone(),
                    name: spec.name.clone(),
                    selector: VersionSelector::parse(&spec.version),
                })
            })
            .collect()
    }
}

/// Sync behavior settings for the repo tool
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepoSettings {
    /// Timeout in seconds for individual git operations (default: 300)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Emit per-entry progress lines (default: true)
    #[serde(default = "default_true")]
    pub verbose: bool,

    /// Bounded worker pool width for repository processing (default: 1, serial)
    #[serde(default = "default_parallel_jobs")]
    pub parallel_jobs: usize,

    /// Default arguments passed to the file-copy tool (default: ["-av"])
    #[serde(default = "default_rsync_args")]
    pub rsync_args: Vec<String>,

    /// Default exclude patterns for file copies
    #[serde(default)]
    pub rsync_excludes: Vec<String>,

    /// Local firmware directory mirrored alongside the repositories when a
    /// copy operation runs (optional)
    #[serde(default)]
    pub firmware_dir: Option<PathBuf>,
}

impl Default for RepoSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            verbose: true,
            parallel_jobs: default_parallel_jobs(),
            rsync_args: default_rsync_args(),
            rsync_excludes: Vec::new(),
            firmware_dir: None,
        }
    }
}

/// One configured repository
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepositoryEntry {
    /// Unique repository name; also the mirror output subdirectory
    pub name: String,

    /// Remote source URL
    pub url: String,

    /// Branch to track (default: "main")
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Local clone destination
    pub dest_dir: PathBuf,

    /// Disabled entries are skipped and counted as success (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Relative paths to mirror; empty means the whole tree
    #[serde(default)]
    pub copy_files: Vec<String>,

    /// Per-entry override of the copy tool arguments
    #[serde(default)]
    pub rsync_args: Option<Vec<String>>,

    /// Per-entry override of the exclude patterns
    #[serde(default)]
    pub rsync_excludes: Option<Vec<String>>,
}

impl RepositoryEntry {
    /// Effective copy-tool arguments (entry override or settings default)
    #[must_use]
    pub fn effective_rsync_args(&self, settings: &RepoSettings) -> Vec<String> {
        self.rsync_args
            .clone()
            .unwrap_or_else(|| settings.rsync_args.clone())
    }

    /// Effective exclude patterns (entry override or settings default)
    #[must_use]
    pub fn effective_excludes(&self, settings: &RepoSettings) -> Vec<String> {
        self.rsync_excludes
            .clone()
            .unwrap_or_else(|| settings.rsync_excludes.clone())
    }
}

/// Configuration document for the repository synchronizer
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Sync behavior settings
    #[serde(default)]
    pub settings: RepoSettings,

    /// Configured repositories
    #[serde(default)]
    pub repositories: Vec<RepositoryEntry>,
}

impl RepoConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns a fatal [`Error::Config`] when the file does not exist, and
    /// [`Error::TomlParse`] when it cannot be parsed.
    pub fn load(path: &Path) -> Result<Self> {
        load_toml(path)
    }

    /// Select repositories by name, keeping configuration order
    ///
    /// An empty request list selects everything. Unknown names are fatal so a
    /// typo never silently syncs nothing.
    pub fn select(&self, names: &[String]) -> Result<Vec<RepositoryEntry>> {
        if names.is_empty() {
            return Ok(self.repositories.clone());
        }

        let missing: Vec<&str> = names
            .iter()
            .filter(|n| !self.repositories.iter().any(|r| &r.name == *n))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            let available: Vec<&str> =
                self.repositories.iter().map(|r| r.name.as_str()).collect();
            return Err(Error::Precondition(format!(
                "repository(ies) not found: {} (available: {})",
                missing.join(", "),
                available.join(", ")
            )));
        }

        Ok(names
            .iter()
            .filter_map(|n| self.repositories.iter().find(|r| &r.name == n).cloned())
            .collect())
    }
}

fn load_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::Config {
                message: format!("{} not found", path.display()),
                key: None,
            }
        } else {
            Error::Io(e)
        }
    })?;
    Ok(toml::from_str(&raw)?)
}
