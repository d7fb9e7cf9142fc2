//! Snapshot capture job: one camera, one frame, one file.
//!
//! A job moves through `CONNECTING` into one of `FRAME_RECEIVED`, `TIMED_OUT` or
//! `CONNECT_FAILED` and always terminates with a [`CaptureOutcome`]. The frame is held in
//! memory until it is complete, written to a hidden `.part` sibling and renamed into place,
//! so an aborted job never leaves a partial image behind.
//!
//! The configured timeout is one deadline for the whole job: the grab and the write share
//! it, and a write still running at the deadline is abandoned as a timeout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use regex::Regex;
use serde::Serialize;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::{CaptureConfig, CredentialSet, RtspSettings};
use crate::contract::FrameGrabber;
use crate::credentials::resolve_credentials;
use crate::error::CaptureError;
use crate::inventory::{CameraRecord, CameraType};

pub const SNAPSHOT_EXTENSION: &str = "jpg";

/// Terminal result of one capture job.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureOutcome {
    pub camera_name: String,
    pub address: String,
    pub camera_type: CameraType,
    pub success: bool,
    pub elapsed_seconds: f64,
    pub error: Option<String>,
    pub timestamp: DateTime<Local>,
    pub output_path: Option<PathBuf>,
}

impl CaptureOutcome {
    pub fn failure(record: &CameraRecord, elapsed_seconds: f64, error: impl ToString) -> Self {
        Self {
            camera_name: record.name.clone(),
            address: record.address.clone(),
            camera_type: record.camera_type,
            success: false,
            elapsed_seconds,
            error: Some(error.to_string()),
            timestamp: Local::now(),
            output_path: None,
        }
    }

    fn success(record: &CameraRecord, elapsed_seconds: f64, path: PathBuf) -> Self {
        Self {
            camera_name: record.name.clone(),
            address: record.address.clone(),
            camera_type: record.camera_type,
            success: true,
            elapsed_seconds,
            error: None,
            timestamp: Local::now(),
            output_path: Some(path),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    FrameReceived,
    TimedOut,
    ConnectFailed,
}

impl Stage {
    fn as_str(&self) -> &'static str {
        match self {
            Stage::FrameReceived => "FRAME_RECEIVED",
            Stage::TimedOut => "TIMED_OUT",
            Stage::ConnectFailed => "CONNECT_FAILED",
        }
    }
}

fn illegal_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[\s<>:"/\\|?*\x00-\x1f]"#).expect("static regex"))
}

/// Replaces whitespace and characters that are illegal in file names with `_`.
pub fn sanitize_name(name: &str) -> String {
    illegal_chars().replace_all(name.trim(), "_").into_owned()
}

/// Dots and colons in an address become `_`, as do illegal path characters.
pub fn sanitize_address(address: &str) -> String {
    sanitize_name(&address.replace(['.', ':'], "_"))
}

/// `rtsp://<user>:<password>@<address>:<port>/<path>`
pub fn rtsp_url(address: &str, credentials: &CredentialSet, rtsp: &RtspSettings) -> String {
    format!(
        "rtsp://{}:{}@{}:{}/{}",
        credentials.username,
        credentials.password,
        address,
        rtsp.port,
        rtsp.path.trim_start_matches('/')
    )
}

/// `<run_dir>/<TYPE>/<name>_<address>_<YYYYMMDD_HHMMSS_micros>.jpg`
pub fn snapshot_path(run_dir: &Path, record: &CameraRecord, at: DateTime<Local>) -> PathBuf {
    let file_name = format!(
        "{}_{}_{}.{}",
        sanitize_name(&record.name),
        sanitize_address(&record.address),
        at.format("%Y%m%d_%H%M%S_%6f"),
        SNAPSHOT_EXTENSION
    );
    run_dir.join(record.camera_type.as_str()).join(file_name)
}

fn part_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{file_name}.{}.part", uuid::Uuid::new_v4()))
}

async fn persist_frame(path: &Path, part: &Path, frame: &[u8]) -> Result<(), CaptureError> {
    let write_err = |source: std::io::Error| CaptureError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(folder) = path.parent() {
        // create_dir_all tolerates a concurrent job creating the same folder
        fs::create_dir_all(folder).await.map_err(write_err)?;
    }

    if let Err(e) = fs::write(part, frame).await {
        let _ = fs::remove_file(part).await;
        return Err(write_err(e));
    }
    if let Err(e) = fs::rename(part, path).await {
        let _ = fs::remove_file(part).await;
        return Err(write_err(e));
    }
    Ok(())
}

/// Writes `frame` to `path` unless `deadline` passes first, in which case any `.part`
/// file is removed and the job times out.
async fn persist_before(
    deadline: tokio::time::Instant,
    budget: Duration,
    path: &Path,
    frame: &[u8],
) -> Result<(), CaptureError> {
    let part = part_path(path);
    match tokio::time::timeout_at(deadline, persist_frame(path, &part, frame)).await {
        Ok(result) => result,
        Err(_) => {
            let _ = fs::remove_file(&part).await;
            Err(CaptureError::Timeout(budget.as_secs_f64()))
        }
    }
}

/// Runs one capture job. Every failure, including the timeout, is folded into the
/// returned outcome.
pub async fn capture_camera<G>(
    grabber: &G,
    record: &CameraRecord,
    config: &CaptureConfig,
) -> CaptureOutcome
where
    G: FrameGrabber + ?Sized,
{
    let started = Instant::now();
    let deadline = tokio::time::Instant::now() + config.timeout;
    let credentials = resolve_credentials(record, &config.credentials);
    let url = rtsp_url(&record.address, credentials, &config.rtsp);

    debug!(camera = %record.name, address = %record.address, "[CAPTURE] CONNECTING");

    let grabbed = match tokio::time::timeout_at(deadline, grabber.grab_frame(&url)).await {
        Ok(Ok(frame)) if frame.is_empty() => Err((Stage::ConnectFailed, CaptureError::EmptyFrame)),
        Ok(Ok(frame)) => Ok(frame),
        Ok(Err(e)) => Err((Stage::ConnectFailed, e)),
        Err(_) => Err((
            Stage::TimedOut,
            CaptureError::Timeout(config.timeout.as_secs_f64()),
        )),
    };

    let result = match grabbed {
        Ok(frame) => {
            debug!(
                camera = %record.name,
                bytes = frame.len(),
                stage = Stage::FrameReceived.as_str(),
                "[CAPTURE] Frame received"
            );
            let path = snapshot_path(&config.run_dir(), record, Local::now());
            persist_before(deadline, config.timeout, &path, &frame)
                .await
                .map(|_| path)
        }
        Err((stage, e)) => {
            debug!(camera = %record.name, stage = stage.as_str(), error = %e, "[CAPTURE] No frame");
            Err(e)
        }
    };

    let elapsed = started.elapsed().as_secs_f64();
    match result {
        Ok(path) => {
            info!(
                camera = %record.name,
                address = %record.address,
                path = %path.display(),
                elapsed_secs = elapsed,
                "[CAPTURE] Saved snapshot"
            );
            CaptureOutcome::success(record, elapsed, path)
        }
        Err(e) => {
            warn!(
                camera = %record.name,
                address = %record.address,
                elapsed_secs = elapsed,
                error = %e,
                "[CAPTURE] Capture failed"
            );
            CaptureOutcome::failure(record, elapsed, e)
        }
    }
}

/// Grabs frames by spawning `ffmpeg` and reading one MJPEG frame from its stdout.
///
/// The child is spawned with `kill_on_drop`, so when the capture job's timeout drops the
/// wait future the process receives SIGKILL instead of lingering.
#[derive(Debug, Clone)]
pub struct FfmpegGrabber {
    binary: PathBuf,
}

impl Default for FfmpegGrabber {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegGrabber {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Runs `ffmpeg -version` and returns the first line of its output.
    pub async fn check_available(&self) -> Result<String, CaptureError> {
        let output = Command::new(&self.binary)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                CaptureError::Spawn(format!("{} not found: {e}", self.binary.display()))
            })?;

        if !output.status.success() {
            return Err(CaptureError::Decoder(format!(
                "{} -version exited with {}",
                self.binary.display(),
                output.status
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        Ok(version.lines().next().unwrap_or("unknown").to_string())
    }
}

#[async_trait::async_trait]
impl FrameGrabber for FfmpegGrabber {
    async fn grab_frame(&self, stream_url: &str) -> Result<Vec<u8>, CaptureError> {
        let child = Command::new(&self.binary)
            .args([
                "-rtsp_transport",
                "tcp",
                "-i",
                stream_url,
                "-frames:v",
                "1",
                "-q:v",
                "2",
                "-f",
                "image2pipe",
                "-vcodec",
                "mjpeg",
                "-loglevel",
                "error",
                "-y",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::Spawn(e.to_string()))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CaptureError::Decoder(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::Decoder(format!(
                "exit {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(CaptureError::EmptyFrame);
        }
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(name: &str, address: &str) -> CameraRecord {
        CameraRecord {
            name: name.into(),
            address: address.into(),
            camera_type: CameraType::Ptz,
            analytics: String::new(),
        }
    }

    #[test]
    fn sanitizes_spaces_and_illegal_characters() {
        assert_eq!(sanitize_name("Main Gate / North"), "Main_Gate___North");
        assert_eq!(sanitize_name("a:b*c?"), "a_b_c_");
        assert_eq!(sanitize_address("10.0.0.12"), "10_0_0_12");
    }

    #[test]
    fn snapshot_path_layout() {
        let at = Local.with_ymd_and_hms(2025, 11, 26, 9, 5, 7).unwrap();
        let path = snapshot_path(
            Path::new("/data/images/2025-11-26"),
            &record("Bus Stand", "10.1.2.3"),
            at,
        );
        assert_eq!(
            path,
            PathBuf::from("/data/images/2025-11-26/PTZ/Bus_Stand_10_1_2_3_20251126_090507_000000.jpg")
        );
    }

    #[test]
    fn rtsp_url_uses_settings() {
        let creds = CredentialSet::new("admin", "pw");
        let url = rtsp_url("10.0.0.1", &creds, &RtspSettings::default());
        assert_eq!(url, "rtsp://admin:pw@10.0.0.1:554/stream1");

        let custom = RtspSettings {
            port: 8554,
            path: "/live/main".into(),
        };
        assert_eq!(
            rtsp_url("cam.local", &creds, &custom),
            "rtsp://admin:pw@cam.local:8554/live/main"
        );
    }

    #[tokio::test]
    async fn write_past_deadline_times_out_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("PTZ").join("Gate_10_0_0_1_x.jpg");

        let err = persist_before(
            tokio::time::Instant::now(),
            Duration::from_secs(7),
            &path,
            b"\xFF\xD8\xFF\xD9",
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CaptureError::Timeout(_)));
        assert!(!path.exists());
        let leftovers = std::fs::read_dir(dir.path().join("PTZ"))
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn write_within_deadline_lands_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("FIXED").join("Yard_10_0_0_2_x.jpg");

        persist_before(
            tokio::time::Instant::now() + Duration::from_secs(5),
            Duration::from_secs(5),
            &path,
            b"frame",
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"frame");
        assert_eq!(std::fs::read_dir(dir.path().join("FIXED")).unwrap().count(), 1);
    }
}
