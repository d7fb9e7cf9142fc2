//! `load_config` module: parses the static YAML config file and turns its sections, plus the
//! camera secrets from the environment, into the core's `CaptureConfig` and `SyncConfig`.
//!
//! The YAML file never holds secrets. Camera passwords come from:
//! - `CAMERA_USERNAME` (optional, defaults to `admin`)
//! - `CAMERA_PASSWORD_ANALYTICS`
//! - `CAMERA_PASSWORD_DEFAULT`
//!
//! ```yaml
//! capture:
//!   inventory: ./cameras.xlsx
//!   output_root: ./snapshots
//!   location: guntur
//!   max_workers: 30
//!   timeout_secs: 7
//! sync:
//!   local_root: ./snapshots/2025-11-26_guntur
//!   bucket: camera-snapshots
//!   credentials: ./gcs-credentials.json
//! ```
//!
//! Errors are `anyhow::Error` and surface at the CLI boundary.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use camsnap_core::config::{
    date_folder_name, CaptureConfig, CredentialSet, Credentials, RtspSettings, SyncConfig,
    DEFAULT_MAX_WORKERS, DEFAULT_RTSP_PATH, DEFAULT_RTSP_PORT, DEFAULT_SYNC_CONCURRENCY,
    DEFAULT_TIMEOUT_SECS,
};
use camsnap_core::inventory::ColumnSchema;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{error, info};

pub const ENV_CAMERA_USERNAME: &str = "CAMERA_USERNAME";
pub const ENV_PASSWORD_ANALYTICS: &str = "CAMERA_PASSWORD_ANALYTICS";
pub const ENV_PASSWORD_DEFAULT: &str = "CAMERA_PASSWORD_DEFAULT";
pub const DEFAULT_CAMERA_USERNAME: &str = "admin";

#[derive(Debug, Default, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub capture: Option<CaptureSection>,
    #[serde(default)]
    pub sync: Option<SyncSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureSection {
    pub inventory: PathBuf,
    pub output_root: PathBuf,
    /// Appended to the date folder, e.g. `2025-11-26_guntur`.
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    #[serde(default)]
    pub rtsp: RtspSection,
    #[serde(default)]
    pub columns: ColumnSchema,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RtspSection {
    #[serde(default = "default_rtsp_port")]
    pub port: u16,
    #[serde(default = "default_rtsp_path")]
    pub path: String,
}

impl Default for RtspSection {
    fn default() -> Self {
        Self {
            port: DEFAULT_RTSP_PORT,
            path: DEFAULT_RTSP_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncSection {
    pub local_root: PathBuf,
    pub bucket: String,
    pub credentials: PathBuf,
    #[serde(default = "default_sync_concurrency")]
    pub concurrency: usize,
    /// Overrides the storage API endpoint, e.g. for an emulator.
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

fn default_timeout_secs() -> f64 {
    DEFAULT_TIMEOUT_SECS as f64
}

fn default_rtsp_port() -> u16 {
    DEFAULT_RTSP_PORT
}

fn default_rtsp_path() -> String {
    DEFAULT_RTSP_PATH.to_string()
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_sync_concurrency() -> usize {
    DEFAULT_SYNC_CONCURRENCY
}

/// Command-line values that take precedence over the `capture:` section.
#[derive(Debug, Clone, Default)]
pub struct CaptureOverrides {
    pub inventory: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
    pub location: Option<String>,
    pub max_workers: Option<usize>,
    pub timeout_secs: Option<f64>,
}

impl CaptureSection {
    pub fn apply(mut self, overrides: &CaptureOverrides) -> Self {
        if let Some(inventory) = &overrides.inventory {
            self.inventory = inventory.clone();
        }
        if let Some(output_root) = &overrides.output_root {
            self.output_root = output_root.clone();
        }
        if let Some(location) = &overrides.location {
            self.location = Some(location.clone());
        }
        if let Some(max_workers) = overrides.max_workers {
            self.max_workers = max_workers;
        }
        if let Some(timeout_secs) = overrides.timeout_secs {
            self.timeout_secs = timeout_secs;
        }
        self
    }

    /// Builds the capture run config for `date`, reading camera secrets from the environment.
    pub fn into_capture_config(&self, date: NaiveDate) -> Result<CaptureConfig> {
        if !self.timeout_secs.is_finite() || self.timeout_secs <= 0.0 {
            bail!("timeout_secs must be a positive number, got {}", self.timeout_secs);
        }
        let timeout = match Duration::try_from_secs_f64(self.timeout_secs) {
            Ok(timeout) => timeout,
            Err(e) => bail!("timeout_secs {} is out of range: {e}", self.timeout_secs),
        };
        Ok(CaptureConfig {
            output_root: self.output_root.clone(),
            date_folder: date_folder_name(date, self.location.as_deref()),
            max_workers: self.max_workers.max(1),
            timeout,
            rtsp: RtspSettings {
                port: self.rtsp.port,
                path: self.rtsp.path.clone(),
            },
            credentials: credentials_from_env()?,
        })
    }
}

impl SyncSection {
    pub fn into_sync_config(&self) -> SyncConfig {
        SyncConfig {
            local_root: self.local_root.clone(),
            bucket: self.bucket.clone(),
            credentials_path: self.credentials.clone(),
            concurrency: self.concurrency.max(1),
        }
    }
}

fn required_env(name: &str) -> Result<String> {
    env::var(name).map_err(|e| {
        error!(variable = name, error = ?e, "Required environment variable missing");
        anyhow!("{name} must be set in the environment or .env")
    })
}

/// Reads both camera credential sets from the environment.
pub fn credentials_from_env() -> Result<Credentials> {
    let username =
        env::var(ENV_CAMERA_USERNAME).unwrap_or_else(|_| DEFAULT_CAMERA_USERNAME.to_string());
    Ok(Credentials {
        analytics: CredentialSet::new(username.clone(), required_env(ENV_PASSWORD_ANALYTICS)?),
        default: CredentialSet::new(username, required_env(ENV_PASSWORD_DEFAULT)?),
    })
}

/// Loads the static YAML config file. Sections are validated when a command uses them.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    let config: CliConfig = serde_yaml::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
        anyhow!("Failed to parse config YAML: {e}")
    })?;

    info!(
        config_path = ?path_ref,
        capture = config.capture.is_some(),
        sync = config.sync.is_some(),
        "Parsed config YAML successfully"
    );
    Ok(config)
}

impl CliConfig {
    pub fn capture_section(&self) -> Result<&CaptureSection> {
        self.capture
            .as_ref()
            .context("config file has no 'capture' section")
    }

    pub fn sync_section(&self) -> Result<&SyncSection> {
        self.sync.as_ref().context("config file has no 'sync' section")
    }
}
