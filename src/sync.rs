//! Repository synchronization via an external version-control tool
//!
//! Orchestration is written against the narrow [`VersionControl`] trait so
//! the per-entry state machine is testable without spawning real processes;
//! [`GitCli`] is the production implementation over the `git` binary.
//!
//! Per entry, terminal states are success or failure:
//! - destination missing: clone at the configured branch
//! - destination is a valid repository: fetch, checkout the target branch if
//!   not already active, pull
//! - destination exists but is not a repository: fail without touching it

use crate::config::RepositoryEntry;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Narrow seam over the external version-control collaborator
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Whether `dir` is a valid local repository
    async fn is_repository(&self, dir: &Path) -> bool;

    /// Clone `url` at `branch` into `dest`
    async fn clone_branch(&self, url: &str, branch: &str, dest: &Path) -> Result<()>;

    /// Fetch remote changes for the repository at `dir`
    async fn fetch(&self, dir: &Path) -> Result<()>;

    /// Name of the currently checked-out branch at `dir`
    async fn current_branch(&self, dir: &Path) -> Result<String>;

    /// Check out `branch` at `dir`
    async fn checkout(&self, dir: &Path, branch: &str) -> Result<()>;

    /// Pull the active branch at `dir`
    async fn pull(&self, dir: &Path) -> Result<()>;
}

/// CLI-based version control using the external git binary
pub struct GitCli {
    binary_path: PathBuf,
    timeout: Option<Duration>,
}

impl GitCli {
    /// Create a handler with an explicit binary path and no timeout
    #[must_use]
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            timeout: None,
        }
    }

    /// Attempt to find git in PATH
    #[must_use]
    pub fn from_path() -> Option<Self> {
        which::which("git").ok().map(Self::new)
    }

    /// Bound each git invocation by a timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run git with the given arguments, never prompting for credentials
    async fn run(&self, dir: Option<&Path>, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.binary_path);
        cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }

        debug!(args = ?args, "running git");
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| {
                    Error::ExternalTool(format!(
                        "git {} timed out after {}s",
                        args.first().unwrap_or(&""),
                        limit.as_secs()
                    ))
                })?,
            None => cmd.output().await,
        }
        .map_err(|e| Error::ExternalTool(format!("failed to execute git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ExternalTool(format!(
                "git {} failed: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl VersionControl for GitCli {
    // Discovery must not escape `dir`: git searches parent directories, so a
    // plain directory inside some enclosing working tree would otherwise pass.
    // The toplevel has to be the destination itself.
    async fn is_repository(&self, dir: &Path) -> bool {
        let Ok(stdout) = self.run(Some(dir), &["rev-parse", "--show-toplevel"]).await else {
            return false;
        };
        let toplevel = tokio::fs::canonicalize(Path::new(stdout.trim())).await;
        let dest = tokio::fs::canonicalize(dir).await;
        matches!((toplevel, dest), (Ok(a), Ok(b)) if a == b)
    }

    async fn clone_branch(&self, url: &str, branch: &str, dest: &Path) -> Result<()> {
        let dest = dest.to_string_lossy();
        self.run(None, &["clone", "--branch", branch, url, dest.as_ref()])
            .await?;
        Ok(())
    }

    async fn fetch(&self, dir: &Path) -> Result<()> {
        self.run(Some(dir), &["fetch", "origin"]).await?;
        Ok(())
    }

    async fn current_branch(&self, dir: &Path) -> Result<String> {
        let stdout = self
            .run(Some(dir), &["rev-parse", "--abbrev-ref", "HEAD"])
            .await?;
        Ok(stdout.trim().to_string())
    }

    async fn checkout(&self, dir: &Path, branch: &str) -> Result<()> {
        self.run(Some(dir), &["checkout", branch]).await?;
        Ok(())
    }

    async fn pull(&self, dir: &Path) -> Result<()> {
        self.run(Some(dir), &["pull"]).await?;
        Ok(())
    }
}

/// Bring one configured repository to its target branch
///
/// Disabled entries are skipped and reported as success with a
/// distinguishing message. A destination that exists but is not a
/// repository is a terminal failure and is never overwritten.
///
/// # Errors
///
/// Clone, fetch, checkout, and pull failures are terminal for the entry and
/// surface as [`Error::ExternalTool`]; the batch controller records them.
pub async fn sync_repository(vcs: &dyn VersionControl, entry: &RepositoryEntry) -> Result<String> {
    if !entry.enabled {
        return Ok(format!("skipped {} (disabled)", entry.name));
    }

    let dest = entry.dest_dir.as_path();
    if !dest.exists() {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        info!(url = %entry.url, branch = %entry.branch, dest = %dest.display(), "cloning");
        vcs.clone_branch(&entry.url, &entry.branch, dest).await?;
        return Ok(format!("cloned {}", entry.url));
    }

    if !vcs.is_repository(dest).await {
        return Err(Error::NotARepository(dest.to_path_buf()));
    }

    info!(dest = %dest.display(), "fetching updates");
    vcs.fetch(dest).await?;

    let active = vcs.current_branch(dest).await?;
    if active != entry.branch {
        info!(from = %active, to = %entry.branch, "switching branch");
        vcs.checkout(dest, &entry.branch).await?;
    }

    vcs.pull(dest).await?;
    Ok(format!("synced {}", dest.display()))
}
