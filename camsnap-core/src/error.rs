//! Error types for inventory loading, capture, manifests and storage sync.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading and mapping the camera inventory. All of them are fatal.
#[derive(Error, Debug)]
pub enum InventoryError {
    /// The inventory file does not exist.
    #[error("Inventory file not found: {0}")]
    NotFound(PathBuf),

    /// The file extension is not a supported tabular format.
    #[error("Unsupported inventory format for {path}: expected .xlsx, .xls, .xlsm, .ods or .csv")]
    UnsupportedFormat { path: PathBuf },

    /// The spreadsheet has no sheet or no header row.
    #[error("Inventory {0} contains no header row")]
    Empty(PathBuf),

    /// One or more required logical columns could not be matched to a header.
    #[error("Inventory is missing required columns: {}", .missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    #[error("Failed to read spreadsheet {path}: {message}")]
    Spreadsheet { path: PathBuf, message: String },

    #[error("Failed to read CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Failure of a single capture attempt. Never escapes a capture job; it is folded into the
/// job's outcome.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("decoder spawn failed: {0}")]
    Spawn(String),

    #[error("decoder failed: {0}")]
    Decoder(String),

    #[error("decoder returned empty output")]
    EmptyFrame,

    #[error("timed out after {0:.1}s")]
    Timeout(f64),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("capture task aborted: {0}")]
    Aborted(String),
}

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to create manifest directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write manifest {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Errors from an object store backend.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("Access denied to gs://{bucket}/{key}: {message}")]
    AccessDenied {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("I/O error for {path}: {message}")]
    Io { path: String, message: String },

    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Unexpected response {status} for {key}: {message}")]
    Api {
        key: String,
        status: u16,
        message: String,
    },

    #[error("{message}")]
    Other { message: String },
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io {
            path: String::new(),
            message: err.to_string(),
        }
    }
}

/// Fatal preconditions of a sync run. Per-file failures are counted, not raised.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Local images directory not found: {0}")]
    LocalRootMissing(PathBuf),

    #[error("Local images directory {0} has no folder name to key uploads under")]
    LocalRootUnnamed(PathBuf),

    #[error("Storage credential file not found: {0}")]
    CredentialsMissing(PathBuf),

    #[error("Bucket '{0}' does not exist")]
    BucketMissing(String),

    #[error("Bucket check failed: {0}")]
    Storage(#[from] StorageError),
}
