//! # contract: seams between the core pipelines and the outside world
//!
//! Two traits sit here:
//! - [`FrameGrabber`] pulls a single encoded frame from a camera stream. The production
//!   implementation is [`crate::capture::FfmpegGrabber`].
//! - [`ObjectStore`] is the slice of a cloud bucket API the synchroniser needs: a bucket
//!   check, an object size lookup and a file upload. The production implementation lives in
//!   the CLI crate.
//!
//! Both are annotated for `mockall` so tests can script them deterministically. Timing
//! behavior (a grabber that never returns) is better tested with a hand-written stub.

use std::path::Path;

use async_trait::async_trait;
use mockall::automock;

use crate::error::{CaptureError, StorageError};

/// Obtains exactly one encoded image frame from a live stream.
///
/// Implementations do not need to enforce a deadline; the capture job wraps every call in
/// its own timeout and drops the future on expiry, so anything the grabber owns must be
/// released on drop (child processes included).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait FrameGrabber: Send + Sync {
    async fn grab_frame(&self, stream_url: &str) -> Result<Vec<u8>, CaptureError>;
}

/// Minimal object store surface for synchronising a local tree into one bucket.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Whether the configured bucket exists and is reachable.
    async fn bucket_exists(&self) -> Result<bool, StorageError>;

    /// Size in bytes of the object at `key`, or `None` if it does not exist.
    async fn head_object(&self, key: &str) -> Result<Option<u64>, StorageError>;

    /// Uploads the file at `path` to `key`, replacing any existing object.
    async fn put_object_from_file(&self, key: &str, path: &Path) -> Result<(), StorageError>;
}
