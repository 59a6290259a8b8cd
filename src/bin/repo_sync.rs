//! Repository synchronizer CLI
//!
//! Clones or fast-forwards configured git repositories and optionally
//! mirrors selected files into a destination tree via rsync. Exit code 0 on
//! full success, 1 if any entry failed.

use clap::Parser;
use fw_sync::{
    Error, GitCli, Operation, Outcome, RepoBatch, RepoConfig, Result, RsyncCli, mirror_tree,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "repo-sync",
    about = "Synchronize git repositories based on TOML configuration",
    version
)]
struct Args {
    /// Repository names to process (all configured repositories if omitted)
    repositories: Vec<String>,

    /// Configuration file to use
    #[arg(short, long, default_value = "repos.toml")]
    config: PathBuf,

    /// List all repository names from the configuration and exit
    #[arg(short, long)]
    list: bool,

    /// Enable verbose output (overrides config setting)
    #[arg(short, long)]
    verbose: bool,

    /// Disable verbose output (overrides config setting)
    #[arg(short, long)]
    quiet: bool,

    /// Number of parallel jobs (overrides config setting)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Show what would be done without running git or rsync
    #[arg(long)]
    dry_run: bool,

    /// Base directory to copy files to (one subdirectory per repository)
    #[arg(long, value_name = "DIR")]
    copy_to: Option<PathBuf>,

    /// Operation to perform
    #[arg(short, long, value_enum, default_value_t = Operation::Sync)]
    operation: Operation,
}

fn init_tracing(verbose: bool, quiet: bool, config_verbose: bool) {
    let default_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else if config_verbose {
        "info"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match run(args).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            // Tracing may not be initialized yet when config loading fails
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<i32> {
    let config = RepoConfig::load(&args.config)?;
    init_tracing(args.verbose, args.quiet, config.settings.verbose);

    if config.repositories.is_empty() {
        println!("No repositories found in configuration");
        return Ok(0);
    }

    if args.list {
        println!("Available repositories:");
        for repo in &config.repositories {
            let status = if repo.enabled { "enabled" } else { "disabled" };
            println!("  {} ({status}) - {}", repo.name, repo.url);
        }
        return Ok(0);
    }

    let entries = config.select(&args.repositories)?;

    let mut settings = config.settings.clone();
    if let Some(jobs) = args.jobs {
        settings.parallel_jobs = jobs;
    }

    if args.operation.includes_copy() && args.copy_to.is_none() {
        return Err(Error::Precondition(
            "--copy-to is required when using 'copy' or 'both' operations".to_string(),
        ));
    }

    if args.dry_run {
        println!("DRY RUN - No repositories will be modified");
        for entry in &entries {
            if !entry.enabled {
                println!("Would skip: {} (disabled)", entry.name);
                continue;
            }
            if args.operation.includes_sync() {
                println!(
                    "Would sync: {} ({}) -> {}",
                    entry.name,
                    entry.url,
                    entry.dest_dir.display()
                );
            }
            if args.operation.includes_copy()
                && let Some(copy_to) = &args.copy_to
            {
                println!(
                    "Would copy: {} -> {}",
                    entry.name,
                    copy_to.join(&entry.name).display()
                );
            }
        }
        return Ok(0);
    }

    let vcs = GitCli::from_path()
        .ok_or_else(|| Error::ToolUnavailable("git".to_string()))?
        .with_timeout(Duration::from_secs(settings.timeout_seconds));

    let copier = if args.operation.includes_copy() {
        let rsync =
            RsyncCli::from_path().ok_or_else(|| Error::ToolUnavailable("rsync".to_string()))?;
        Some(Arc::new(rsync) as Arc<dyn fw_sync::FileCopier>)
    } else {
        None
    };

    info!(
        repositories = entries.len(),
        parallel_jobs = settings.parallel_jobs,
        operation = ?args.operation,
        "starting"
    );

    let batch = Arc::new(RepoBatch {
        vcs: Arc::new(vcs),
        copier: copier.clone(),
        settings: settings.clone(),
        copy_base_dir: args.copy_to.clone(),
        operation: args.operation,
    });
    let mut report = batch.run(entries).await;

    // Local firmware directory rides along with copy operations
    if args.operation.includes_copy()
        && let (Some(copier), Some(copy_to), Some(firmware_dir)) =
            (&copier, &args.copy_to, &settings.firmware_dir)
    {
        if firmware_dir.exists() {
            let dest = copy_to.join("firmware");
            let result =
                mirror_tree(copier.as_ref(), firmware_dir, &dest, &settings.rsync_args).await;
            match result {
                Ok(message) => report.push(Outcome::success("firmware-dir", message)),
                Err(e) => report.push(Outcome::failure("firmware-dir", e.to_string())),
            }
        } else {
            info!(dir = %firmware_dir.display(), "firmware directory does not exist, skipping");
        }
    }

    report.log_summary("repositories");
    Ok(report.exit_code())
}
