//! Remote firmware catalog: fetch, device lookup, version resolution
//!
//! The catalog is a JSON array of firmware products, each with an ordered
//! version history (position 0 is the newest). It is fetched once per
//! invocation into an explicit [`Catalog`] value that resolver calls borrow;
//! nothing is memoized behind the caller's back.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Version labels containing any of these markers are treated as prereleases
/// by the `stable` selector.
const PRERELEASE_MARKERS: &[&str] = &["beta", "alpha", "rc", "dev"];

/// Requested version policy for one firmware
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VersionSelector {
    /// First version in the catalog's ordered history
    Latest,
    /// First version labeled "stable" or carrying no prerelease marker,
    /// falling back to the first version
    Stable,
    /// Every version in the history, each downloaded independently
    All,
    /// First version whose label contains this substring
    Exact(String),
}

impl VersionSelector {
    /// Parse the configuration string form of a selector
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "latest" => VersionSelector::Latest,
            "stable" => VersionSelector::Stable,
            "all" => VersionSelector::All,
            other => VersionSelector::Exact(other.to_string()),
        }
    }
}

impl std::fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionSelector::Latest => f.write_str("latest"),
            VersionSelector::Stable => f.write_str("stable"),
            VersionSelector::All => f.write_str("all"),
            VersionSelector::Exact(s) => f.write_str(s),
        }
    }
}

/// One version record within a catalog entry
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FirmwareVersion {
    /// Version label, e.g. "v1.2.0" or "1.2.0-beta"
    #[serde(default)]
    pub version: String,

    /// Download file reference, appended to the firmware base URL
    #[serde(default)]
    pub file: String,
}

/// One firmware product with an ordered version history (newest first)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Device family name; matched case-insensitively against device names
    #[serde(default)]
    pub category: String,

    /// Firmware product name
    #[serde(default)]
    pub name: String,

    /// Firmware author
    #[serde(default)]
    pub author: String,

    /// Ordered version history; position 0 is "latest"
    #[serde(default)]
    pub versions: Vec<FirmwareVersion>,
}

impl CatalogEntry {
    /// Resolve a selector against this entry's version history
    ///
    /// Returns the resolved versions in catalog order: a single element for
    /// `latest`/`stable`/exact selectors, the full history for `all`, and
    /// `None` when nothing matches (including an empty history).
    #[must_use]
    pub fn resolve_versions(&self, selector: &VersionSelector) -> Option<Vec<&FirmwareVersion>> {
        if self.versions.is_empty() {
            return None;
        }

        match selector {
            VersionSelector::Latest => Some(vec![&self.versions[0]]),
            VersionSelector::Stable => {
                let stable = self.versions.iter().find(|v| {
                    let label = v.version.to_lowercase();
                    label.contains("stable")
                        || !PRERELEASE_MARKERS.iter().any(|m| label.contains(m))
                });
                // No clean label anywhere: fall back to latest
                Some(vec![stable.unwrap_or(&self.versions[0])])
            }
            VersionSelector::All => Some(self.versions.iter().collect()),
            VersionSelector::Exact(wanted) => self
                .versions
                .iter()
                .find(|v| v.version.contains(wanted.as_str()))
                .map(|v| vec![v]),
        }
    }
}

/// Fetched-once firmware catalog
///
/// Constructed via [`Catalog::fetch`] (or [`Catalog::new`] in tests) and
/// passed by reference to resolution calls.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Build a catalog from already-decoded entries
    #[must_use]
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Fetch and decode the remote catalog
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] on transport failure, [`Error::HttpStatus`]
    /// on a non-success response, and a decode error when the payload is not
    /// a firmware array.
    pub async fn fetch(client: &reqwest::Client, url: &str) -> Result<Self> {
        info!(url, "fetching firmware catalog");
        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let entries: Vec<CatalogEntry> = response.json().await?;
        info!(entries = entries.len(), "fetched firmware catalog");
        Ok(Self::new(entries))
    }

    /// Number of catalog entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted, deduplicated list of device family names (lowercased)
    #[must_use]
    pub fn devices(&self) -> Vec<String> {
        let mut devices: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.category.is_empty())
            .map(|e| e.category.to_lowercase())
            .collect();
        devices.sort();
        devices.dedup();
        devices
    }

    /// All entries whose category equals the device name (case-insensitive)
    #[must_use]
    pub fn entries_for_device(&self, device: &str) -> Vec<&CatalogEntry> {
        let device = device.to_lowercase();
        self.entries
            .iter()
            .filter(|e| e.category.to_lowercase() == device)
            .collect()
    }

    /// Find a firmware for a device by name
    ///
    /// Matching is case-insensitive and bidirectional: the catalog name may
    /// contain the requested name or vice versa. The first match in catalog
    /// order wins; when several names overlap, later entries are never
    /// considered. That ambiguity is long-standing tool behavior and is kept
    /// as-is rather than tightened to exact matching.
    #[must_use]
    pub fn find_firmware(&self, device: &str, name: &str) -> Option<&CatalogEntry> {
        let wanted = name.to_lowercase();
        let found = self.entries_for_device(device).into_iter().find(|e| {
            let candidate = e.name.to_lowercase();
            candidate.contains(&wanted) || wanted.contains(&candidate)
        });
        if found.is_none() {
            debug!(device, name, "no catalog entry matched");
        }
        found
    }
}
