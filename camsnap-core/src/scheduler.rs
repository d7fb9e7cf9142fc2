//! Capture scheduler: fans one capture job per camera out over a bounded pool and folds the
//! outcomes, in completion order, into a [`CaptureSummary`].
//!
//! Each job runs as its own tokio task so a panic inside one camera's job is contained and
//! reported as that camera's failure. At most `max_workers` jobs are in flight; the rest
//! wait for a free slot. A job cannot hang the pool because [`capture_camera`] bounds every
//! grab with the configured timeout.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info};

use crate::capture::{capture_camera, CaptureOutcome};
use crate::config::CaptureConfig;
use crate::contract::FrameGrabber;
use crate::error::CaptureError;
use crate::inventory::{CameraRecord, CameraType};

/// A camera whose capture failed, as written to the failure manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedRecord {
    pub camera_name: String,
    pub address: String,
    pub camera_type: CameraType,
    pub failed_at: DateTime<Local>,
    pub error: Option<String>,
}

impl From<&CaptureOutcome> for FailedRecord {
    fn from(outcome: &CaptureOutcome) -> Self {
        Self {
            camera_name: outcome.camera_name.clone(),
            address: outcome.address.clone(),
            camera_type: outcome.camera_type,
            failed_at: outcome.timestamp,
            error: outcome.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CaptureSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Failed cameras in the order their jobs finished.
    pub failed_records: Vec<FailedRecord>,
    pub wall_clock_seconds: f64,
}

impl CaptureSummary {
    fn record(&mut self, outcome: &CaptureOutcome) {
        self.total += 1;
        if outcome.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
            self.failed_records.push(FailedRecord::from(outcome));
        }
    }
}

/// Captures every camera in `cameras` with at most `config.max_workers` jobs running at
/// once. Duplicate addresses are expected to have been removed already.
pub async fn run_captures<G>(
    cameras: Vec<CameraRecord>,
    config: Arc<CaptureConfig>,
    grabber: Arc<G>,
) -> CaptureSummary
where
    G: FrameGrabber + 'static,
{
    let started = Instant::now();
    let mut summary = CaptureSummary::default();

    if cameras.is_empty() {
        info!("[CAPTURE] No cameras to capture");
        return summary;
    }

    let workers = config.max_workers.max(1);
    info!(
        cameras = cameras.len(),
        workers = workers.min(cameras.len()),
        timeout_secs = config.timeout.as_secs_f64(),
        "[CAPTURE] Starting capture run"
    );

    let mut outcomes = stream::iter(cameras)
        .map(|record| {
            let config = Arc::clone(&config);
            let grabber = Arc::clone(&grabber);
            async move {
                let submitted = Instant::now();
                let job_record = record.clone();
                let handle = tokio::spawn(async move {
                    capture_camera(grabber.as_ref(), &job_record, &config).await
                });
                match handle.await {
                    Ok(outcome) => outcome,
                    Err(join_err) => {
                        error!(
                            camera = %record.name,
                            address = %record.address,
                            error = %join_err,
                            "[CAPTURE] Capture task aborted"
                        );
                        CaptureOutcome::failure(
                            &record,
                            submitted.elapsed().as_secs_f64(),
                            CaptureError::Aborted(join_err.to_string()),
                        )
                    }
                }
            }
        })
        .buffer_unordered(workers);

    while let Some(outcome) = outcomes.next().await {
        summary.record(&outcome);
    }

    summary.wall_clock_seconds = started.elapsed().as_secs_f64();
    info!(
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        wall_clock_secs = summary.wall_clock_seconds,
        "[CAPTURE] Capture run complete"
    );
    summary
}
