//! Firmware downloader CLI
//!
//! Resolves configured device/firmware/version requests against the remote
//! catalog and downloads the binaries, then fetches matching assets from
//! configured GitHub releases. Exit code 0 on full success, 1 if any entry
//! failed.

use clap::Parser;
use fw_sync::{
    Catalog, Error, Fetcher, FirmwareConfig, Result, run_firmware_batch, run_github_batch,
};
use std::path::PathBuf;
use tracing::error;

#[derive(Parser, Debug)]
#[command(
    name = "fw-download",
    about = "Download device firmware from a JSON catalog and GitHub releases",
    version
)]
struct Args {
    /// Configuration file to use
    #[arg(short, long, default_value = "firmware.toml")]
    config: PathBuf,

    /// List all available devices and exit
    #[arg(long)]
    list_devices: bool,

    /// List all firmware for the specified device and exit
    #[arg(long, value_name = "DEVICE")]
    list_firmware: Option<String>,

    /// Download firmware only for the specified device
    #[arg(long)]
    device: Option<String>,

    /// Download only the specified firmware name (requires --device)
    #[arg(long)]
    firmware: Option<String>,

    /// Show what would be downloaded without actually downloading
    #[arg(long)]
    dry_run: bool,

    /// Overwrite existing files
    #[arg(long)]
    force: bool,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Download only GitHub releases (skip catalog firmware)
    #[arg(long)]
    github_only: bool,

    /// Skip GitHub releases (download only catalog firmware)
    #[arg(long)]
    skip_github: bool,
}

fn init_tracing(quiet: bool) {
    let default_level = if quiet { "error" } else { "info" };
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
    init_tracing(args.quiet);

    match run(args).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<i32> {
    let mut config = FirmwareConfig::load(&args.config)?;
    if args.force {
        config.settings.overwrite_existing = true;
    }

    let fetcher = Fetcher::new(&config.settings)?;

    if args.list_devices {
        let catalog = Catalog::fetch(fetcher.client(), &config.settings.catalog_url).await?;
        println!("Available devices:");
        for device in catalog.devices() {
            println!("  {device}");
        }
        return Ok(0);
    }

    if let Some(device) = &args.list_firmware {
        let catalog = Catalog::fetch(fetcher.client(), &config.settings.catalog_url).await?;
        let entries = catalog.entries_for_device(device);
        if entries.is_empty() {
            println!("No firmware found for device: {device}");
            return Ok(0);
        }
        println!("Available firmware for {device}:");
        for entry in entries {
            let latest = entry
                .versions
                .first()
                .map_or("None", |v| v.version.as_str());
            println!(
                "  {} by {} ({} versions, latest: {})",
                entry.name,
                entry.author,
                entry.versions.len(),
                latest
            );
        }
        return Ok(0);
    }

    if args.firmware.is_some() && args.device.is_none() {
        return Err(Error::Precondition(
            "--firmware requires --device to be specified".to_string(),
        ));
    }

    let mut requests = config.requests();
    if let Some(device) = &args.device {
        requests.retain(|r| &r.device == device);
        if requests.is_empty() {
            println!("No firmware configurations found for device: {device}");
            return Ok(0);
        }
    }
    if let Some(firmware) = &args.firmware {
        let wanted = firmware.to_lowercase();
        requests.retain(|r| r.name.to_lowercase().contains(&wanted));
        if requests.is_empty() {
            println!("No firmware configurations found for: {firmware}");
            return Ok(0);
        }
    }

    if args.dry_run {
        println!("DRY RUN - No files will be downloaded");
        if !args.github_only {
            for request in &requests {
                println!(
                    "Would download: {} for {} to {}/{}/",
                    request.name,
                    request.device,
                    config.settings.output_base_dir.display(),
                    request.device_key
                );
            }
        }
        if !args.skip_github {
            for entry in &config.github_releases {
                println!(
                    "Would download GitHub release: {} to {}/{}/",
                    entry.name,
                    config.settings.output_base_dir.display(),
                    entry.name
                );
            }
        }
        return Ok(0);
    }

    let mut overall = fw_sync::BatchReport::default();

    if !args.github_only && !requests.is_empty() {
        // The catalog is fetched once and shared by every request
        let catalog = Catalog::fetch(fetcher.client(), &config.settings.catalog_url).await?;
        let report = run_firmware_batch(
            &fetcher,
            &catalog,
            &requests,
            &config.settings.firmware_base_url,
        )
        .await;
        report.log_summary("firmware");
        overall.merge(report);
    }

    if !args.skip_github && !config.github_releases.is_empty() {
        let report = run_github_batch(&fetcher, &config.github_releases).await;
        report.log_summary("github-releases");
        overall.merge(report);
    }

    overall.log_summary("overall");
    Ok(overall.exit_code())
}
