//! Error types for fw-sync
//!
//! One crate-wide error enum with a variant per failure family:
//! - Fatal configuration / precondition errors that abort an invocation
//! - Per-entry resolution failures (device/firmware/version/asset absent)
//! - Transport and filesystem errors
//! - External tool failures (git, rsync)
//!
//! The batch controller converts per-entry errors into failure outcomes;
//! only configuration loading and precondition checks propagate far enough
//! to abort a whole run.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for fw-sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for fw-sync
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "output_base_dir")
        key: Option<String>,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON deserialization error (catalog or GitHub API payload)
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration parse error
    #[error("invalid configuration file: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// No firmware catalog entries exist for the requested device
    #[error("device not found in catalog: {0}")]
    DeviceNotFound(String),

    /// No catalog entry matched the requested firmware name
    #[error("firmware '{name}' not found for device '{device}'")]
    FirmwareNotFound {
        /// Requested device display name
        device: String,
        /// Requested firmware name
        name: String,
    },

    /// No catalog version matched the requested selector
    #[error("version '{selector}' not found for firmware '{name}'")]
    VersionNotFound {
        /// Firmware name whose versions were searched
        name: String,
        /// The selector that failed to resolve
        selector: String,
    },

    /// A resolved catalog version has no download file reference
    #[error("no download file specified for {name} {version}")]
    MissingDownloadFile {
        /// Firmware name
        name: String,
        /// Version label
        version: String,
    },

    /// The latest release has no assets at all
    #[error("no assets found in latest release of {0}")]
    NoAssets(String),

    /// The latest release has assets, but none match the configured pattern
    #[error("no assets matching pattern '{pattern}' found in {name}")]
    NoMatchingAssets {
        /// Release entry name
        name: String,
        /// The glob pattern that matched nothing
        pattern: String,
    },

    /// A releases page URL could not be translated into an API endpoint
    #[error("invalid GitHub releases URL: {0}")]
    InvalidReleasesUrl(String),

    /// An asset filename glob pattern failed to compile
    #[error("invalid file pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Parse error reported by the glob engine
        reason: String,
    },

    /// A sync destination exists but is not a repository; never overwritten
    #[error("directory {0} exists but is not a git repository")]
    NotARepository(PathBuf),

    /// External tool execution failed (git, rsync)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Required external tool is not installed or not on PATH
    #[error("{0} is not available on this system")]
    ToolUnavailable(String),

    /// Invalid flag combination or missing prerequisite for the operation
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// HTTP request completed with a non-success status
    #[error("HTTP error {status} fetching {url}")]
    HttpStatus {
        /// Response status code
        status: u16,
        /// The URL that was fetched
        url: String,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Construct a configuration error without an associated key
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: None,
        }
    }

    /// Whether this error aborts the whole invocation rather than a single entry
    ///
    /// Per-entry failures are collected into batch outcomes; fatal errors
    /// (bad configuration, failed preconditions, missing tools) stop the run
    /// before or instead of the batch.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config { .. }
                | Error::TomlParse(_)
                | Error::Precondition(_)
                | Error::ToolUnavailable(_)
        )
    }
}
