//! Mirrors a local image tree into an object store bucket.
//!
//! For every image the walker finds, the remote object is looked up first:
//!   - same key and same byte size remotely: skipped
//!   - missing, or a different size: uploaded (overwriting)
//!   - any error on the way: counted as failed, logged, and the run moves on
//!
//! Size equality is the only freshness check, so a same-size file with different content
//! is treated as already synced. Re-running after a partial run is safe: finished files
//! are skipped.
//!
//! # Preconditions
//! The local root must be a named folder, and it, the credential file and the bucket must
//! all exist before any file is touched. Those failures are returned as [`SyncError`];
//! per-file failures never are.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::SyncConfig;
use crate::contract::ObjectStore;
use crate::error::{StorageError, SyncError};
use crate::walker::{walk_images, LocalFileEntry};

/// What the store reported for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub key: String,
    pub exists: bool,
    pub size: Option<u64>,
}

impl RemoteTarget {
    /// True when the remote object exists with exactly `local_size` bytes.
    pub fn matches_size(&self, local_size: u64) -> bool {
        self.exists && self.size == Some(local_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDecision {
    Uploaded,
    Skipped,
    Failed,
}

/// Counts for one sync run. `uploaded + skipped + failed == total_files` once finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub total_files: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SyncSummary {
    fn record(&mut self, decision: FileDecision) {
        self.total_files += 1;
        match decision {
            FileDecision::Uploaded => self.uploaded += 1,
            FileDecision::Skipped => self.skipped += 1,
            FileDecision::Failed => self.failed += 1,
        }
    }
}

/// Fails fast when the local root or the credential file is missing, or when the local
/// root has no folder name to key remote objects under (e.g. `/`).
pub fn check_preconditions(config: &SyncConfig) -> Result<(), SyncError> {
    if !config.local_root.is_dir() {
        error!(path = %config.local_root.display(), "[SYNC] Local images directory not found");
        return Err(SyncError::LocalRootMissing(config.local_root.clone()));
    }
    let resolved = std::fs::canonicalize(&config.local_root)
        .unwrap_or_else(|_| config.local_root.clone());
    if resolved.file_name().is_none() {
        error!(path = %config.local_root.display(), "[SYNC] Local images directory has no folder name");
        return Err(SyncError::LocalRootUnnamed(config.local_root.clone()));
    }
    if !config.credentials_path.is_file() {
        error!(path = %config.credentials_path.display(), "[SYNC] Storage credential file not found");
        return Err(SyncError::CredentialsMissing(config.credentials_path.clone()));
    }
    Ok(())
}

pub async fn remote_target<S>(store: &S, key: &str) -> Result<RemoteTarget, StorageError>
where
    S: ObjectStore + ?Sized,
{
    let size = store.head_object(key).await?;
    Ok(RemoteTarget {
        key: key.to_string(),
        exists: size.is_some(),
        size,
    })
}

async fn try_sync_file<S>(store: &S, entry: &LocalFileEntry) -> Result<FileDecision, StorageError>
where
    S: ObjectStore + ?Sized,
{
    let local_size = tokio::fs::metadata(&entry.path)
        .await
        .map_err(|e| StorageError::Io {
            path: entry.path.display().to_string(),
            message: e.to_string(),
        })?
        .len();

    let target = remote_target(store, &entry.remote_key).await?;
    if target.matches_size(local_size) {
        debug!(key = %entry.remote_key, size = local_size, "[SYNC] Already uploaded, skipping");
        return Ok(FileDecision::Skipped);
    }

    store.put_object_from_file(&entry.remote_key, &entry.path).await?;
    debug!(
        key = %entry.remote_key,
        size = local_size,
        replaced = target.exists,
        "[SYNC] Uploaded"
    );
    Ok(FileDecision::Uploaded)
}

/// Decides and performs the transfer for one file. Errors become [`FileDecision::Failed`].
pub async fn sync_file<S>(store: &S, entry: &LocalFileEntry) -> FileDecision
where
    S: ObjectStore + ?Sized,
{
    match try_sync_file(store, entry).await {
        Ok(decision) => decision,
        Err(e) => {
            error!(
                path = %entry.path.display(),
                key = %entry.remote_key,
                error = %e,
                "[SYNC][ERROR] Upload failed"
            );
            FileDecision::Failed
        }
    }
}

/// Syncs every entry with at most `concurrency` files in flight.
pub async fn sync_entries<S, I>(store: &S, entries: I, concurrency: usize) -> SyncSummary
where
    S: ObjectStore + ?Sized,
    I: IntoIterator<Item = LocalFileEntry>,
{
    let mut summary = SyncSummary::default();
    let mut decisions = stream::iter(entries)
        .map(|entry| async move { sync_file(store, &entry).await })
        .buffer_unordered(concurrency.max(1));

    while let Some(decision) = decisions.next().await {
        summary.record(decision);
        if summary.total_files % 100 == 0 {
            info!(
                processed = summary.total_files,
                uploaded = summary.uploaded,
                skipped = summary.skipped,
                failed = summary.failed,
                "[SYNC] Progress"
            );
        }
    }
    summary
}

/// Full sync run: preconditions, bucket check, walk, per-file transfer.
pub async fn synchronise<S>(config: &SyncConfig, store: &S) -> Result<SyncSummary, SyncError>
where
    S: ObjectStore + ?Sized,
{
    check_preconditions(config)?;

    if !store.bucket_exists().await? {
        error!(bucket = %config.bucket, "[SYNC] Bucket does not exist");
        return Err(SyncError::BucketMissing(config.bucket.clone()));
    }
    info!(bucket = %config.bucket, "[SYNC] Connected to bucket");

    let root = std::fs::canonicalize(&config.local_root)
        .unwrap_or_else(|_| config.local_root.clone());
    info!(root = %root.display(), "[SYNC] Scanning local directory");

    let summary = sync_entries(store, walk_images(&root), config.concurrency).await;
    if summary.total_files == 0 {
        info!(root = %root.display(), "[SYNC] No image files found to upload");
    } else {
        info!(
            total = summary.total_files,
            uploaded = summary.uploaded,
            skipped = summary.skipped,
            failed = summary.failed,
            "[SYNC] Synchronisation complete"
        );
    }
    Ok(summary)
}
