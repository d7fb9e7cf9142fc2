use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DEFAULT_MAX_WORKERS: usize = 30;
pub const DEFAULT_TIMEOUT_SECS: u64 = 7;
pub const DEFAULT_RTSP_PORT: u16 = 554;
pub const DEFAULT_RTSP_PATH: &str = "stream1";
pub const DEFAULT_SYNC_CONCURRENCY: usize = 1;

/// A username/password pair for the cameras' RTSP endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet {
    pub username: String,
    pub password: String,
}

impl CredentialSet {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The two credential sets a fleet is provisioned with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub analytics: CredentialSet,
    pub default: CredentialSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtspSettings {
    pub port: u16,
    pub path: String,
}

impl Default for RtspSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_RTSP_PORT,
            path: DEFAULT_RTSP_PATH.to_string(),
        }
    }
}

/// Everything a capture run needs, built once at startup.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub output_root: PathBuf,
    /// Name of the per-run folder under `output_root`, e.g. `2025-11-26` or `2025-11-26_guntur`.
    pub date_folder: String,
    pub max_workers: usize,
    pub timeout: Duration,
    pub rtsp: RtspSettings,
    pub credentials: Credentials,
}

impl CaptureConfig {
    /// `<output_root>/<date_folder>`
    pub fn run_dir(&self) -> PathBuf {
        self.output_root.join(&self.date_folder)
    }

    pub fn trace_loaded(&self) {
        info!(
            output_root = %self.output_root.display(),
            date_folder = %self.date_folder,
            max_workers = self.max_workers,
            timeout_secs = self.timeout.as_secs_f64(),
            "Loaded CaptureConfig"
        );
        debug!(?self, "CaptureConfig loaded (full debug)");
    }
}

/// Builds the run folder name: the date, optionally suffixed with a location label.
pub fn date_folder_name(date: NaiveDate, location: Option<&str>) -> String {
    let day = date.format("%Y-%m-%d").to_string();
    match location.map(str::trim).filter(|l| !l.is_empty()) {
        Some(location) => format!("{day}_{location}"),
        None => day,
    }
}

/// Sync run settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub local_root: PathBuf,
    pub bucket: String,
    pub credentials_path: PathBuf,
    pub concurrency: usize,
}

impl SyncConfig {
    pub fn trace_loaded(&self) {
        info!(
            local_root = %self.local_root.display(),
            bucket = %self.bucket,
            credentials_path = %self.credentials_path.display(),
            concurrency = self.concurrency,
            "Loaded SyncConfig"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_folder_without_location() {
        let date = NaiveDate::from_ymd_opt(2025, 11, 26).unwrap();
        assert_eq!(date_folder_name(date, None), "2025-11-26");
        assert_eq!(date_folder_name(date, Some("  ")), "2025-11-26");
    }

    #[test]
    fn date_folder_with_location() {
        let date = NaiveDate::from_ymd_opt(2025, 11, 25).unwrap();
        assert_eq!(date_folder_name(date, Some("chittoor")), "2025-11-25_chittoor");
    }

    #[test]
    fn credential_debug_hides_password() {
        let creds = CredentialSet::new("admin", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }
}
