//! Failure manifest: a CSV listing of every camera that could not be captured in a run.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::error::ManifestError;
use crate::scheduler::FailedRecord;

pub const MANIFEST_FILE_NAME: &str = "missing.csv";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestWrite {
    Written { path: PathBuf, rows: usize },
    NoFailures,
}

#[derive(Serialize)]
struct ManifestRow<'a> {
    #[serde(rename = "Camera Name")]
    camera_name: &'a str,
    #[serde(rename = "IP")]
    address: &'a str,
    #[serde(rename = "Camera Type")]
    camera_type: &'a str,
    #[serde(rename = "Failed At")]
    failed_at: String,
    #[serde(rename = "Error")]
    error: &'a str,
}

/// Writes `failures` to `<run_dir>/missing.csv`. Writes nothing for an empty slice.
pub fn write_failure_manifest(
    run_dir: &Path,
    failures: &[FailedRecord],
) -> Result<ManifestWrite, ManifestError> {
    if failures.is_empty() {
        info!("[CAPTURE] No failures, manifest not written");
        return Ok(ManifestWrite::NoFailures);
    }

    std::fs::create_dir_all(run_dir).map_err(|source| ManifestError::Io {
        path: run_dir.to_path_buf(),
        source,
    })?;

    let path = run_dir.join(MANIFEST_FILE_NAME);
    let csv_err = |source: csv::Error| ManifestError::Csv {
        path: path.clone(),
        source,
    };

    let mut writer = csv::Writer::from_path(&path).map_err(csv_err)?;
    for failure in failures {
        writer
            .serialize(ManifestRow {
                camera_name: &failure.camera_name,
                address: &failure.address,
                camera_type: failure.camera_type.as_str(),
                failed_at: failure.failed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                error: failure.error.as_deref().unwrap_or(""),
            })
            .map_err(csv_err)?;
    }
    writer
        .flush()
        .map_err(|e| csv_err(csv::Error::from(e)))?;

    info!(path = %path.display(), rows = failures.len(), "[CAPTURE] Saved failure manifest");
    Ok(ManifestWrite::Written {
        path,
        rows: failures.len(),
    })
}
