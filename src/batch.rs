//! Batch execution and success/failure aggregation
//!
//! Every configured entry (a firmware request, a GitHub release, or a
//! repository) runs to a terminal outcome; one entry's failure never aborts
//! the batch. Firmware downloads run strictly sequentially; repository
//! processing may fan out across a bounded worker pool. The final report
//! drives the process exit code: non-zero iff any entry failed.

use crate::catalog::Catalog;
use crate::config::{FirmwareRequest, GithubReleaseEntry, RepoSettings, RepositoryEntry};
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::github;
use crate::mirror::{self, FileCopier};
use crate::sync::{self, VersionControl};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Terminal result of one batch entry
#[derive(Clone, Debug)]
pub struct Outcome {
    /// Entry identifier (firmware label, release name, or repository name)
    pub name: String,
    /// Whether the entry reached its success state
    pub success: bool,
    /// Human-readable detail
    pub message: String,
}

impl Outcome {
    /// Successful outcome
    #[must_use]
    pub fn success(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: true,
            message: message.into(),
        }
    }

    /// Failed outcome
    #[must_use]
    pub fn failure(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: false,
            message: message.into(),
        }
    }
}

/// Aggregated outcomes of one or more batches
#[derive(Clone, Debug, Default)]
pub struct BatchReport {
    outcomes: Vec<Outcome>,
}

impl BatchReport {
    /// Record one outcome
    pub fn push(&mut self, outcome: Outcome) {
        self.outcomes.push(outcome);
    }

    /// Record an entry's result, converting an error into a failure outcome
    pub fn record(&mut self, name: impl Into<String>, result: Result<String>) {
        match result {
            Ok(message) => self.push(Outcome::success(name, message)),
            Err(e) => self.push(Outcome::failure(name, e.to_string())),
        }
    }

    /// Fold another report into this one
    pub fn merge(&mut self, other: BatchReport) {
        self.outcomes.extend(other.outcomes);
    }

    /// All recorded outcomes
    #[must_use]
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    /// Number of successful entries
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    /// Number of failed entries
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Total entries processed
    #[must_use]
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Process exit code: 1 iff any entry failed
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(self.failed() > 0)
    }

    /// Emit the structured summary for this report
    pub fn log_summary(&self, label: &str) {
        info!(
            batch = label,
            successful = self.succeeded(),
            failed = self.failed(),
            total = self.total(),
            "batch complete"
        );
        for outcome in self.outcomes.iter().filter(|o| !o.success) {
            error!(batch = label, entry = %outcome.name, reason = %outcome.message, "failed");
        }
    }
}

/// Download all configured firmware requests, strictly sequentially
pub async fn run_firmware_batch(
    fetcher: &Fetcher,
    catalog: &Catalog,
    requests: &[FirmwareRequest],
    firmware_base_url: &str,
) -> BatchReport {
    let mut report = BatchReport::default();
    for request in requests {
        let result = fetcher
            .fetch_request(catalog, request, firmware_base_url)
            .await;
        report.record(request.label(), result);
    }
    report
}

/// Download all configured GitHub release entries, strictly sequentially
pub async fn run_github_batch(fetcher: &Fetcher, entries: &[GithubReleaseEntry]) -> BatchReport {
    let mut report = BatchReport::default();
    for entry in entries {
        let result = github::fetch_release_assets(fetcher, entry).await;
        report.record(entry.name.clone(), result);
    }
    report
}

/// Operation mode for the repository tool
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Operation {
    /// Git synchronization only
    Sync,
    /// File copying only
    Copy,
    /// Git synchronization followed by file copying
    Both,
}

impl Operation {
    /// Whether this mode performs git synchronization
    #[must_use]
    pub fn includes_sync(self) -> bool {
        matches!(self, Operation::Sync | Operation::Both)
    }

    /// Whether this mode performs file copying
    #[must_use]
    pub fn includes_copy(self) -> bool {
        matches!(self, Operation::Copy | Operation::Both)
    }
}

/// Shared context for one repository batch
///
/// Tasks share no mutable state; each operates on its own destination
/// directory, so fan-out needs no coordination beyond the worker pool bound.
pub struct RepoBatch {
    /// Version-control collaborator
    pub vcs: Arc<dyn VersionControl>,
    /// File-copy collaborator; required for copy operations
    pub copier: Option<Arc<dyn FileCopier>>,
    /// Effective sync settings
    pub settings: RepoSettings,
    /// Mirror destination base directory
    pub copy_base_dir: Option<PathBuf>,
    /// Operation mode
    pub operation: Operation,
}

impl RepoBatch {
    /// Process one repository entry to a terminal state
    ///
    /// # Errors
    ///
    /// Sync and copy failures are terminal for the entry; the batch runner
    /// records them without aborting the batch.
    pub async fn process_entry(&self, entry: &RepositoryEntry) -> Result<String> {
        if !entry.enabled {
            return Ok(format!("skipped {} (disabled)", entry.name));
        }

        let mut sync_message = String::new();
        if self.operation.includes_sync() {
            sync_message = sync::sync_repository(self.vcs.as_ref(), entry).await?;
        }

        if !self.operation.includes_copy() {
            return Ok(sync_message);
        }

        if self.operation == Operation::Copy && !entry.dest_dir.exists() {
            return Err(Error::Precondition(format!(
                "repository directory {} does not exist (cannot copy without sync first)",
                entry.dest_dir.display()
            )));
        }

        let copier = self
            .copier
            .as_deref()
            .ok_or_else(|| Error::ToolUnavailable("rsync".to_string()))?;
        let copy_base_dir = self
            .copy_base_dir
            .as_deref()
            .ok_or_else(|| Error::Precondition("no copy destination configured".to_string()))?;

        let copy_message =
            mirror::mirror_repository(copier, entry, &self.settings, copy_base_dir).await?;

        if sync_message.is_empty() {
            Ok(copy_message)
        } else {
            Ok(format!("{sync_message}; {copy_message}"))
        }
    }

    /// Process all entries, fanning out across at most `parallel_jobs` workers
    ///
    /// Serial when `parallel_jobs` is 0 or 1. Panicking tasks are converted
    /// into failure outcomes; the batch always runs to completion.
    pub async fn run(self: Arc<Self>, entries: Vec<RepositoryEntry>) -> BatchReport {
        let jobs = self.settings.parallel_jobs.max(1);
        let mut report = BatchReport::default();

        if jobs == 1 {
            for entry in &entries {
                info!(repo = %entry.name, url = %entry.url, "processing");
                let result = self.process_entry(entry).await;
                report.record(entry.name.clone(), result);
            }
            return report;
        }

        let semaphore = Arc::new(Semaphore::new(jobs));
        let mut tasks = JoinSet::new();
        for entry in entries {
            let batch = Arc::clone(&self);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                info!(repo = %entry.name, url = %entry.url, "processing");
                let result = batch.process_entry(&entry).await;
                (entry.name, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, result)) => report.record(name, result),
                Err(e) => {
                    warn!(error = %e, "repository task aborted");
                    report.push(Outcome::failure("unknown", format!("task failed: {e}")));
                }
            }
        }
        report
    }
}
