//! Enumerates image files under a local root and maps each to its remote object key,
//! `images/<root-folder-name>/<relative/path>`.

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

/// Extensions picked up by the walker, compared case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp"];

pub const REMOTE_PREFIX: &str = "images";

/// A local file paired with the key it is stored under remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileEntry {
    pub path: PathBuf,
    pub remote_key: String,
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Remote key for `path`, or `None` if it is not under `root`.
pub fn remote_key(root: &Path, path: &Path) -> Option<String> {
    let folder = root.file_name()?.to_string_lossy();
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if segments.is_empty() {
        return None;
    }
    Some(format!("{REMOTE_PREFIX}/{folder}/{}", segments.join("/")))
}

/// Lazily walks `root` in traversal order, yielding every image file. Symlinks are
/// followed and keyed by their path under `root`. Entries that cannot be read, including
/// symlink loops and dangling links, are logged and skipped.
pub fn walk_images(root: &Path) -> impl Iterator<Item = LocalFileEntry> + '_ {
    WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "[SYNC] Skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_image(entry.path()))
        .filter_map(move |entry| {
            let remote_key = remote_key(root, entry.path())?;
            Some(LocalFileEntry {
                path: entry.into_path(),
                remote_key,
            })
        })
}
