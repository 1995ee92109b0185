//! Listing the files a container currently holds.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use kiln_cache::{ArchiveDirectoryCache, ArchiveDirectorySnapshot};
use kiln_common::RelativeFile;
use walkdir::WalkDir;

use crate::error::MergeError;

/// File name extensions treated as archives when the path is not on disk.
const ARCHIVE_EXTENSIONS: &[&str] = &["jar", "zip", "aar", "apk", "war", "ear", "jmod"];

/// Whether a container is a loose directory or an archive file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// A directory walked recursively.
    Directory,
    /// A zip-format archive read through its central directory.
    Archive,
}

impl ContainerKind {
    /// Decides the kind of `path`.
    ///
    /// Existing directories are directories and existing files are archives.
    /// A path that no longer exists is an archive if the cache still holds a
    /// snapshot for it or its extension is a known archive extension, and a
    /// directory otherwise.
    pub fn detect(path: &Path, cache: &ArchiveDirectoryCache) -> Self {
        if path.is_dir() {
            return ContainerKind::Directory;
        }
        if path.is_file() || cache.get(path).is_some() {
            return ContainerKind::Archive;
        }
        let has_archive_ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                ARCHIVE_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });
        if has_archive_ext {
            ContainerKind::Archive
        } else {
            ContainerKind::Directory
        }
    }
}

/// Lists every regular file below `root`.
///
/// Symbolic links and directories are skipped. A missing root yields an
/// empty set. The result is sorted, but callers should not rely on walk order.
pub fn index_directory(root: &Path) -> Result<BTreeSet<RelativeFile>, MergeError> {
    let mut files = BTreeSet::new();
    if !root.is_dir() {
        return Ok(files);
    }

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| MergeError::Io {
            path: e.path().unwrap_or(root).to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        match RelativeFile::from_disk(root, entry.path()) {
            Some(file) => {
                files.insert(file);
            }
            None => tracing::debug!(path = %entry.path().display(), "skipping non UTF-8 path"),
        }
    }

    tracing::debug!(root = %root.display(), files = files.len(), "indexed directory");
    Ok(files)
}

/// Returns the current central directory of `archive`.
///
/// A cached snapshot is reused only if the archive on disk still matches it;
/// otherwise the archive is scanned. Returns `None` if the archive does not
/// exist. The cache is never modified.
pub fn archive_snapshot(
    archive: &Path,
    cache: &ArchiveDirectoryCache,
) -> Result<Option<Arc<ArchiveDirectorySnapshot>>, MergeError> {
    if !archive.is_file() {
        return Ok(None);
    }
    if let Some(snapshot) = cache.get_current(archive) {
        return Ok(Some(snapshot));
    }
    scan_archive(archive)
}

/// Reads the central directory of `archive` from disk, ignoring any cached
/// snapshot. Returns `None` if the archive does not exist.
///
/// Archives reported as new or changed must be read this way: a rewrite can
/// keep both the length and the modification time of the file.
pub fn scan_archive(archive: &Path) -> Result<Option<Arc<ArchiveDirectorySnapshot>>, MergeError> {
    if !archive.is_file() {
        return Ok(None);
    }
    let snapshot = ArchiveDirectorySnapshot::scan(archive).map_err(|source| {
        MergeError::ArchiveRead {
            path: archive.to_path_buf(),
            source,
        }
    })?;
    Ok(Some(Arc::new(snapshot)))
}

/// Turns a snapshot's entries into relative files of `archive`.
pub fn snapshot_files(archive: &Path, snapshot: &ArchiveDirectorySnapshot) -> BTreeSet<RelativeFile> {
    snapshot
        .entry_paths()
        .map(|entry| RelativeFile::new(archive, entry))
        .collect()
}

/// Lists every leaf entry of `archive`.
///
/// Directory entries are excluded. A missing archive yields an empty set; an
/// unreadable or corrupt one fails with [`MergeError::ArchiveRead`].
pub fn index_archive(
    archive: &Path,
    cache: &ArchiveDirectoryCache,
) -> Result<BTreeSet<RelativeFile>, MergeError> {
    Ok(archive_snapshot(archive, cache)?
        .map(|snapshot| snapshot_files(archive, &snapshot))
        .unwrap_or_default())
}
