//! # camsnap CLI
//!
//! Command parsing and orchestration only. Inventory loading, capture scheduling, the
//! failure manifest and bucket synchronisation all live in `camsnap-core`; this module wires
//! them to the YAML config, the `ffmpeg` grabber and the GCS client, and prints the run
//! summaries.
//!
//! - `camsnap capture --config camsnap.yaml` snapshots every camera in the inventory.
//! - `camsnap sync --config camsnap.yaml` mirrors a snapshot folder into the bucket.
//!
//! [`run`] is the programmatic entrypoint used by `main` and the integration tests.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use camsnap_core::capture::FfmpegGrabber;
use camsnap_core::inventory::load_inventory;
use camsnap_core::manifest::{write_failure_manifest, ManifestWrite};
use camsnap_core::scheduler::{run_captures, CaptureSummary};
use camsnap_core::synchronise::{check_preconditions, synchronise, SyncSummary};
use chrono::Local;
use clap::{Args, Parser, Subcommand};

use crate::gcs::GcsClient;
use crate::load_config::{load_config, CaptureOverrides};

/// CLI for camsnap: grab one frame from every camera in an inventory, and push the results
/// to cloud storage.
#[derive(Parser)]
#[clap(
    name = "camsnap",
    version,
    about = "Capture RTSP camera snapshots in bulk and synchronise them to a storage bucket"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture one snapshot per camera listed in the inventory
    Capture {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        #[clap(flatten)]
        overrides: CaptureArgs,
    },
    /// Upload a local snapshot folder to the configured bucket, skipping files already there
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Local folder to upload, overriding `sync.local_root`
        #[clap(long)]
        local_root: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct CaptureArgs {
    /// Inventory spreadsheet or CSV, overriding `capture.inventory`
    #[clap(long)]
    pub inventory: Option<PathBuf>,
    /// Snapshot root folder, overriding `capture.output_root`
    #[clap(long)]
    pub output_root: Option<PathBuf>,
    /// Location label appended to the date folder
    #[clap(long)]
    pub location: Option<String>,
    /// Maximum concurrent captures
    #[clap(long)]
    pub workers: Option<usize>,
    /// Per-camera timeout in seconds
    #[clap(long)]
    pub timeout: Option<f64>,
}

impl From<CaptureArgs> for CaptureOverrides {
    fn from(args: CaptureArgs) -> Self {
        CaptureOverrides {
            inventory: args.inventory,
            output_root: args.output_root,
            location: args.location,
            max_workers: args.workers,
            timeout_secs: args.timeout,
        }
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Capture { config, overrides } => run_capture(config, overrides.into()).await,
        Commands::Sync { config, local_root } => run_sync(config, local_root).await,
    }
}

async fn run_capture(config_path: PathBuf, overrides: CaptureOverrides) -> Result<()> {
    let config = load_config(&config_path)?;
    let section = config.capture_section()?.clone().apply(&overrides);
    let capture_config = section.into_capture_config(Local::now().date_naive())?;
    capture_config.trace_loaded();

    let cameras = load_inventory(&section.inventory, &section.columns)
        .with_context(|| format!("Failed to load inventory {}", section.inventory.display()))?;

    let grabber = FfmpegGrabber::new(&section.ffmpeg);
    let version = grabber
        .check_available()
        .await
        .context("ffmpeg is required for capture; install it and make sure it is on PATH")?;
    tracing::info!(command = "capture", ffmpeg = %version, "Decoder available");

    println!("Cameras to capture: {}", cameras.len());
    println!("Saving to: {}", capture_config.run_dir().display());

    let capture_config = Arc::new(capture_config);
    let summary = run_captures(cameras, Arc::clone(&capture_config), Arc::new(grabber)).await;
    print_capture_summary(&summary);

    match write_failure_manifest(&capture_config.run_dir(), &summary.failed_records)? {
        ManifestWrite::Written { path, rows } => {
            println!("Failed cameras ({rows}) saved to: {}", path.display());
        }
        ManifestWrite::NoFailures => println!("All cameras captured, no failures to record"),
    }
    Ok(())
}

async fn run_sync(config_path: PathBuf, local_root: Option<PathBuf>) -> Result<()> {
    let config = load_config(&config_path)?;
    let section = config.sync_section()?;
    let mut sync_config = section.into_sync_config();
    if let Some(local_root) = local_root {
        sync_config.local_root = local_root;
    }
    sync_config.trace_loaded();

    check_preconditions(&sync_config)?;

    let client = GcsClient::from_credentials_file(
        &sync_config.bucket,
        &sync_config.credentials_path,
        section.endpoint.as_deref(),
    )
    .await
    .context("Failed to initialise storage client")?;

    tracing::info!(command = "sync", bucket = %client.bucket(), "Starting synchronisation");
    match synchronise(&sync_config, &client).await {
        Ok(summary) => {
            print_sync_summary(&summary);
            tracing::info!(command = "sync", ?summary, "Synchronisation complete");
            Ok(())
        }
        Err(e) => {
            tracing::error!(command = "sync", error = %e, "Synchronisation failed");
            Err(e.into())
        }
    }
}

fn print_capture_summary(summary: &CaptureSummary) {
    println!();
    println!("Capture Summary");
    println!("  Total:      {}", summary.total);
    println!("  Success:    {}", summary.succeeded);
    println!("  Failed:     {}", summary.failed);
    println!("  Total Time: {:.2}s", summary.wall_clock_seconds);
}

fn print_sync_summary(summary: &SyncSummary) {
    println!();
    println!("Upload Summary");
    if summary.total_files == 0 {
        println!("  No image files found to upload");
        return;
    }
    println!("  Total files: {}", summary.total_files);
    println!("  Uploaded:    {}", summary.uploaded);
    println!("  Skipped:     {}", summary.skipped);
    println!("  Failed:      {}", summary.failed);
}
