//! File mirroring from synced repositories via an external copy tool
//!
//! Mirroring resolves each configured relative path against the repository
//! root, drops missing sources (recorded, non-fatal), and hands the valid
//! ones to the [`FileCopier`] collaborator in a single batched invocation.
//! An empty file list mirrors the whole tree using trailing-slash semantics
//! (copy contents, not the directory itself). [`RsyncCli`] is the production
//! implementation.

use crate::config::{RepoSettings, RepositoryEntry};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

/// Narrow seam over the external file-copy collaborator
#[async_trait]
pub trait FileCopier: Send + Sync {
    /// Copy `sources` into `dest` with tool arguments and exclude patterns
    async fn copy(
        &self,
        sources: &[String],
        dest: &Path,
        args: &[String],
        excludes: &[String],
    ) -> Result<()>;
}

/// CLI-based file copier using the external rsync binary
pub struct RsyncCli {
    binary_path: PathBuf,
}

impl RsyncCli {
    /// Create a copier with an explicit binary path
    #[must_use]
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find rsync in PATH
    #[must_use]
    pub fn from_path() -> Option<Self> {
        which::which("rsync").ok().map(Self::new)
    }
}

#[async_trait]
impl FileCopier for RsyncCli {
    async fn copy(
        &self,
        sources: &[String],
        dest: &Path,
        args: &[String],
        excludes: &[String],
    ) -> Result<()> {
        let mut cmd = Command::new(&self.binary_path);
        cmd.args(args);
        for pattern in excludes {
            cmd.arg("--exclude").arg(pattern);
        }
        cmd.args(sources).arg(dest);

        let output = cmd
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("failed to execute rsync: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ExternalTool(format!(
                "rsync failed: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Resolved sources for one mirror invocation
#[derive(Clone, Debug, Default)]
pub struct MirrorPlan {
    /// Existing source paths, ready for the copy tool
    pub sources: Vec<String>,
    /// Configured paths that do not exist under the repository root
    pub missing: Vec<PathBuf>,
    /// Destination directory (`copy_base_dir/{entry.name}`)
    pub dest: PathBuf,
}

/// Resolve an entry's configured paths into a mirror plan
///
/// With no configured `copy_files` the whole repository tree is mirrored: a
/// single source with a trailing slash so the copy tool replicates contents
/// rather than nesting the directory.
#[must_use]
pub fn plan_mirror(entry: &RepositoryEntry, copy_base_dir: &Path) -> MirrorPlan {
    let dest = copy_base_dir.join(&entry.name);

    if entry.copy_files.is_empty() {
        return MirrorPlan {
            sources: vec![format!("{}/", entry.dest_dir.display())],
            missing: Vec::new(),
            dest,
        };
    }

    let mut sources = Vec::new();
    let mut missing = Vec::new();
    for rel in &entry.copy_files {
        let source = entry.dest_dir.join(rel);
        if source.exists() {
            sources.push(source.display().to_string());
        } else {
            missing.push(source);
        }
    }

    MirrorPlan {
        sources,
        missing,
        dest,
    }
}

/// Mirror one repository's selected paths into the destination tree
///
/// Missing sources are recorded and reported in the success message but are
/// not fatal; an entry with zero valid sources fails. The copy tool is
/// invoked once with all valid sources batched.
///
/// # Errors
///
/// Zero valid sources and copy-tool failure are per-entry errors for the
/// batch controller to record.
pub async fn mirror_repository(
    copier: &dyn FileCopier,
    entry: &RepositoryEntry,
    settings: &RepoSettings,
    copy_base_dir: &Path,
) -> Result<String> {
    let plan = plan_mirror(entry, copy_base_dir);

    for missing in &plan.missing {
        warn!(source = %missing.display(), "source path does not exist");
    }

    if plan.sources.is_empty() {
        return Err(Error::Other(format!(
            "no valid source paths found for {}",
            entry.name
        )));
    }

    tokio::fs::create_dir_all(&plan.dest).await?;

    info!(
        repo = %entry.name,
        items = plan.sources.len(),
        dest = %plan.dest.display(),
        "copying"
    );
    copier
        .copy(
            &plan.sources,
            &plan.dest,
            &entry.effective_rsync_args(settings),
            &entry.effective_excludes(settings),
        )
        .await?;

    let mut message = format!("copied {} items", plan.sources.len());
    if !plan.missing.is_empty() {
        message.push_str(&format!(" ({} items were missing)", plan.missing.len()));
    }
    Ok(message)
}

/// Mirror a whole directory tree (contents, not the directory itself)
///
/// Used for the configured firmware directory that rides along with copy
/// operations.
pub async fn mirror_tree(
    copier: &dyn FileCopier,
    src: &Path,
    dest: &Path,
    args: &[String],
) -> Result<String> {
    tokio::fs::create_dir_all(dest).await?;
    let source = format!("{}/", src.display());
    copier.copy(&[source], dest, args, &[]).await?;
    Ok(format!("synced {} -> {}", src.display(), dest.display()))
}
