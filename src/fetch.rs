//! Streaming asset fetcher and firmware filename construction
//!
//! A [`Fetcher`] owns the HTTP client and output settings for one invocation.
//! Transfers are single-attempt: a download either streams to completion or
//! the partial file is deleted. Existing targets are skipped (reported as
//! success with zero bytes transferred) unless overwriting is enabled.

use crate::catalog::{Catalog, VersionSelector};
use crate::config::{FirmwareRequest, FirmwareSettings};
use crate::error::{Error, Result};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Outcome of a single asset transfer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadStatus {
    /// The asset was streamed to disk; carries the byte count
    Downloaded(u64),
    /// The target already existed and overwriting is disabled; nothing transferred
    SkippedExisting,
}

/// Strip a component down to word characters, hyphens, and underscores,
/// mapping spaces to underscores first.
fn clean_component(raw: &str) -> String {
    raw.replace(' ', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// Clean a version label: drop one leading `v`/`V`, then keep word
/// characters, dots, hyphens, and underscores.
fn clean_version(raw: &str) -> String {
    let stripped = raw
        .strip_prefix('v')
        .or_else(|| raw.strip_prefix('V'))
        .unwrap_or(raw);
    stripped
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect()
}

/// Compose the output filename for one firmware version:
/// `{device}_{name}_{version}.bin`, each part sanitized.
///
/// Already-clean inputs pass through unchanged, so re-applying the function
/// to its own output is a no-op.
#[must_use]
pub fn firmware_filename(device: &str, name: &str, version: &str) -> String {
    format!(
        "{}_{}_{}.bin",
        clean_component(device),
        clean_component(name),
        clean_version(version)
    )
}

/// Asset fetcher bound to one invocation's output settings
pub struct Fetcher {
    client: reqwest::Client,
    base_dir: PathBuf,
    overwrite: bool,
}

impl Fetcher {
    /// Build a fetcher from firmware settings
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new(settings: &FirmwareSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.download_timeout))
            .build()?;
        Ok(Self {
            client,
            base_dir: settings.output_base_dir.clone(),
            overwrite: settings.overwrite_existing,
        })
    }

    /// Build a fetcher around an existing client (test seam)
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_dir: PathBuf, overwrite: bool) -> Self {
        Self {
            client,
            base_dir,
            overwrite,
        }
    }

    /// Shared HTTP client for sibling fetch paths (catalog, GitHub API)
    #[must_use]
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Base output directory
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Target path for an asset under a named subdirectory
    #[must_use]
    pub fn target_path(&self, subdir: &str, filename: &str) -> PathBuf {
        self.base_dir.join(subdir).join(filename)
    }

    /// Download one asset to a target path
    ///
    /// Skips with [`DownloadStatus::SkippedExisting`] when the target exists
    /// and overwriting is disabled. Parent directories are created. On any
    /// transfer or write failure the partial file is removed before the error
    /// is returned; no retry is attempted.
    pub async fn download(&self, url: &str, target: &Path) -> Result<DownloadStatus> {
        if target.exists() && !self.overwrite {
            debug!(target = %target.display(), "file already exists, skipping");
            return Ok(DownloadStatus::SkippedExisting);
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        match self.stream_to_file(url, target).await {
            Ok(bytes) => {
                info!(target = %target.display(), bytes, "downloaded");
                Ok(DownloadStatus::Downloaded(bytes))
            }
            Err(e) => {
                // Never leave a truncated asset behind
                if tokio::fs::remove_file(target).await.is_ok() {
                    warn!(target = %target.display(), "removed partial download");
                }
                Err(e)
            }
        }
    }

    async fn stream_to_file(&self, url: &str, target: &Path) -> Result<u64> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let mut file = tokio::fs::File::create(target).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    /// Resolve and download one configured firmware request
    ///
    /// Looks the request up in the catalog, resolves its version selector,
    /// and downloads each resolved version to
    /// `{base_dir}/{device_key}/{filename}`. An `all` selector fans out into
    /// independent transfers; the request succeeds when at least one of them
    /// downloaded or was skipped.
    ///
    /// # Errors
    ///
    /// Not-found resolution failures and total transfer failure are reported
    /// as errors; the batch controller converts them into failure outcomes.
    pub async fn fetch_request(
        &self,
        catalog: &Catalog,
        request: &FirmwareRequest,
        firmware_base_url: &str,
    ) -> Result<String> {
        info!(firmware = %request.name, device = %request.device, "processing firmware request");

        let entry = catalog
            .find_firmware(&request.device, &request.name)
            .ok_or_else(|| {
                if catalog.entries_for_device(&request.device).is_empty() {
                    Error::DeviceNotFound(request.device.clone())
                } else {
                    Error::FirmwareNotFound {
                        device: request.device.clone(),
                        name: request.name.clone(),
                    }
                }
            })?;

        let versions =
            entry
                .resolve_versions(&request.selector)
                .ok_or_else(|| Error::VersionNotFound {
                    name: request.name.clone(),
                    selector: request.selector.to_string(),
                })?;

        let total = versions.len();
        let mut succeeded = 0usize;
        let mut last_error: Option<Error> = None;
        let mut skipped = false;

        for version in &versions {
            if version.file.is_empty() {
                let err = Error::MissingDownloadFile {
                    name: entry.name.clone(),
                    version: version.version.clone(),
                };
                warn!(%err, "skipping version");
                last_error = Some(err);
                continue;
            }

            let filename = firmware_filename(&request.device, &entry.name, &version.version);
            let target = self.target_path(&request.device_key, &filename);
            let url = format!("{firmware_base_url}{}", version.file);

            match self.download(&url, &target).await {
                Ok(DownloadStatus::Downloaded(_)) => succeeded += 1,
                Ok(DownloadStatus::SkippedExisting) => {
                    succeeded += 1;
                    skipped = true;
                }
                Err(e) => {
                    warn!(version = %version.version, error = %e, "version download failed");
                    last_error = Some(e);
                }
            }
        }

        if succeeded == 0 {
            return Err(last_error.unwrap_or_else(|| Error::VersionNotFound {
                name: request.name.clone(),
                selector: request.selector.to_string(),
            }));
        }

        let message = if matches!(request.selector, VersionSelector::All) {
            format!("downloaded {succeeded}/{total} versions")
        } else if skipped {
            "already up to date".to_string()
        } else {
            "downloaded".to_string()
        };
        Ok(message)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, FirmwareVersion};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_fetcher(base_dir: PathBuf, overwrite: bool) -> Fetcher {
        Fetcher::with_client(reqwest::Client::new(), base_dir, overwrite)
    }

    #[test]
    fn test_filename_composition() {
        assert_eq!(
            firmware_filename("Cardputer", "Bruce Firmware", "v1.9.1"),
            "Cardputer_Bruce_Firmware_1.9.1.bin"
        );
    }

    #[test]
    fn test_filename_strips_special_characters() {
        let name = firmware_filename("M5 StickC+", "Nemo (fork)!", "V2.0~rc");
        assert_eq!(name, "M5_StickC_Nemo_fork_2.0rc.bin");
    }

    #[test]
    fn test_filename_character_set() {
        let name = firmware_filename("dev/ice", "fw:name", "v1.0/β?");
        let stem = name.strip_suffix(".bin").unwrap();
        assert!(
            stem.chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        );
    }

    #[test]
    fn test_filename_cleaning_is_idempotent() {
        let clean = clean_component("Bruce Firmware!");
        assert_eq!(clean_component(&clean), clean);

        let clean = clean_version("v1.9.1-rc+meta");
        assert_eq!(clean_version(&clean), clean);
    }

    #[test]
    fn test_clean_version_strips_only_leading_v() {
        assert_eq!(clean_version("v1.0-dev"), "1.0-dev");
        assert_eq!(clean_version("V2.1"), "2.1");
        // Interior "v" characters are part of the label
        assert_eq!(clean_version("1.0-votive"), "1.0-votive");
    }

    #[tokio::test]
    async fn test_download_streams_to_target() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fw.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"firmware-bytes".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = test_fetcher(dir.path().to_path_buf(), false);
        let target = fetcher.target_path("cardputer", "fw.bin");

        let status = fetcher
            .download(&format!("{}/fw.bin", server.uri()), &target)
            .await
            .unwrap();

        assert_eq!(status, DownloadStatus::Downloaded(14));
        assert_eq!(std::fs::read(&target).unwrap(), b"firmware-bytes");
    }

    #[tokio::test]
    async fn test_existing_target_skips_without_transfer() {
        let server = MockServer::start().await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = test_fetcher(dir.path().to_path_buf(), false);
        let target = fetcher.target_path("cardputer", "fw.bin");
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(&target, b"original").unwrap();

        let status = fetcher
            .download(&format!("{}/fw.bin", server.uri()), &target)
            .await
            .unwrap();

        assert_eq!(status, DownloadStatus::SkippedExisting);
        assert_eq!(std::fs::read(&target).unwrap(), b"original");
        // The server was never contacted
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_existing_target() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = test_fetcher(dir.path().to_path_buf(), true);
        let target = fetcher.target_path("cardputer", "fw.bin");
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(&target, b"old").unwrap();

        fetcher.download(&server.uri(), &target).await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_failed_transfer_leaves_no_partial_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = test_fetcher(dir.path().to_path_buf(), false);
        let target = fetcher.target_path("cardputer", "fw.bin");

        let err = fetcher.download(&server.uri(), &target).await.unwrap_err();
        assert!(matches!(err, Error::HttpStatus { status: 500, .. }));
        assert!(!target.exists());
    }

    fn one_entry_catalog() -> Catalog {
        Catalog::new(vec![CatalogEntry {
            category: "Cardputer".into(),
            name: "Bruce".into(),
            author: "pr3y".into(),
            versions: vec![
                FirmwareVersion {
                    version: "v1.9.1".into(),
                    file: "bruce-191.bin".into(),
                },
                FirmwareVersion {
                    version: "v1.9.0".into(),
                    file: "bruce-190.bin".into(),
                },
            ],
        }])
    }

    fn bruce_request(selector: VersionSelector) -> FirmwareRequest {
        FirmwareRequest {
            device_key: "cardputer".into(),
            device: "Cardputer".into(),
            name: "bruce".into(),
            selector,
        }
    }

    #[tokio::test]
    async fn test_fetch_request_latest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bruce-191.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"bin".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = test_fetcher(dir.path().to_path_buf(), false);
        let base_url = format!("{}/", server.uri());

        let msg = fetcher
            .fetch_request(
                &one_entry_catalog(),
                &bruce_request(VersionSelector::Latest),
                &base_url,
            )
            .await
            .unwrap();

        assert_eq!(msg, "downloaded");
        assert!(
            dir.path()
                .join("cardputer")
                .join("Cardputer_Bruce_1.9.1.bin")
                .exists()
        );
    }

    #[tokio::test]
    async fn test_fetch_request_all_fans_out_and_tolerates_partial_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bruce-191.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"bin".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bruce-190.bin"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = test_fetcher(dir.path().to_path_buf(), false);
        let base_url = format!("{}/", server.uri());

        let msg = fetcher
            .fetch_request(
                &one_entry_catalog(),
                &bruce_request(VersionSelector::All),
                &base_url,
            )
            .await
            .unwrap();

        assert_eq!(msg, "downloaded 1/2 versions");
    }

    #[tokio::test]
    async fn test_fetch_request_unknown_firmware_makes_no_network_call() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let fetcher = test_fetcher(dir.path().to_path_buf(), false);

        let request = FirmwareRequest {
            device_key: "cardputer".into(),
            device: "Cardputer".into(),
            name: "marauder".into(),
            selector: VersionSelector::Latest,
        };
        let err = fetcher
            .fetch_request(&one_entry_catalog(), &request, &server.uri())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::FirmwareNotFound { .. }));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_request_unknown_device() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = test_fetcher(dir.path().to_path_buf(), false);

        let request = FirmwareRequest {
            device_key: "core2".into(),
            device: "Core2".into(),
            name: "bruce".into(),
            selector: VersionSelector::Latest,
        };
        let err = fetcher
            .fetch_request(&one_entry_catalog(), &request, "http://localhost/")
            .await
            .unwrap_err();

        // Absent device and absent firmware are reported distinctly
        assert!(matches!(err, Error::DeviceNotFound(_)));
        assert!(err.to_string().contains("Core2"));
    }

    #[tokio::test]
    async fn test_fetch_request_unknown_version_selector() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = test_fetcher(dir.path().to_path_buf(), false);

        let err = fetcher
            .fetch_request(
                &one_entry_catalog(),
                &bruce_request(VersionSelector::Exact("3.0".into())),
                "http://localhost/",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::VersionNotFound { .. }));
    }
}
