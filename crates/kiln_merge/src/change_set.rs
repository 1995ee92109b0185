//! Expanding one top-level change into per-file changes.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

use kiln_cache::{ArchiveDirectoryCache, ArchiveDirectorySnapshot, FingerprintMode};
use kiln_common::{FileStatus, RelativeFile};

use crate::builder::ChangeMap;
use crate::error::MergeError;
use crate::index::{archive_snapshot, index_directory, scan_archive, snapshot_files, ContainerKind};

/// Per-file changes inside one container, relative to the previous build.
pub type FileChanges = BTreeMap<RelativeFile, FileStatus>;

/// Marks every file in `files` as [`FileStatus::New`].
pub(crate) fn all_new<'a>(files: impl IntoIterator<Item = &'a RelativeFile>) -> FileChanges {
    files
        .into_iter()
        .map(|file| (file.clone(), FileStatus::New))
        .collect()
}

/// Returns the entries of `change_map` that lie strictly below `root`.
///
/// Paths compare component-wise, so every descendant of `root` sorts right
/// after it and the scan stops at the first path outside it.
pub(crate) fn entries_under(root: &Path, change_map: &ChangeMap) -> ChangeMap {
    change_map
        .range::<Path, _>((Bound::Excluded(root), Bound::Unbounded))
        .take_while(|(path, _)| path.starts_with(root))
        .map(|(path, status)| (path.clone(), *status))
        .collect()
}

/// Converts caller-reported per-file statuses into changes of `root`.
///
/// Statuses are trusted as given. Entries that name an existing directory
/// rather than a file are dropped.
pub(crate) fn directory_entry_changes(root: &Path, entries: &ChangeMap) -> FileChanges {
    let mut changes = FileChanges::new();
    for (path, status) in entries {
        if status.has_content() && path.is_dir() {
            continue;
        }
        if let Some(file) = RelativeFile::from_disk(root, path) {
            changes.insert(file, *status);
        }
    }
    changes
}

/// Computes the changes of a directory reported with `status`.
///
/// A NEW directory reports every file it contains. Otherwise the per-file
/// entries from `change_map` under `root` are the source of truth, whatever
/// the directory's own status.
pub fn directory_changes(
    root: &Path,
    status: Option<FileStatus>,
    change_map: &ChangeMap,
) -> Result<FileChanges, MergeError> {
    if status == Some(FileStatus::New) {
        return Ok(all_new(&index_directory(root)?));
    }
    Ok(directory_entry_changes(root, &entries_under(root, change_map)))
}

/// Computes the changes of an archive from its prior and current snapshots.
///
/// `previous` is the cached snapshot from the last successful build and
/// `current` the archive as it is now (`None` if it no longer exists). An
/// archive that was REMOVED, or reported CHANGED but is gone from disk,
/// reports every previous entry as removed and fails with
/// [`MergeError::StaleCache`] if there is no previous snapshot.
pub fn archive_changes(
    archive: &Path,
    status: Option<FileStatus>,
    previous: Option<&ArchiveDirectorySnapshot>,
    current: Option<&ArchiveDirectorySnapshot>,
    mode: FingerprintMode,
) -> Result<FileChanges, MergeError> {
    let Some(status) = status else {
        return Ok(FileChanges::new());
    };

    match (status, current) {
        (FileStatus::New, Some(current)) => {
            Ok(all_new(&snapshot_files(archive, current)))
        }
        (FileStatus::New, None) => Ok(FileChanges::new()),
        (FileStatus::Removed, _) | (FileStatus::Changed, None) => {
            let previous = previous.ok_or_else(|| MergeError::StaleCache {
                archive: archive.to_path_buf(),
            })?;
            Ok(previous
                .entry_paths()
                .map(|entry| (RelativeFile::new(archive, entry), FileStatus::Removed))
                .collect())
        }
        (FileStatus::Changed, Some(current)) => {
            let Some(previous) = previous else {
                tracing::warn!(
                    archive = %archive.display(),
                    "changed archive has no cached snapshot; reporting all entries as new"
                );
                return Ok(all_new(&snapshot_files(archive, current)));
            };
            let diff = current.diff_from(previous, mode);
            let mut changes = FileChanges::new();
            for (entries, status) in [
                (&diff.added, FileStatus::New),
                (&diff.changed, FileStatus::Changed),
                (&diff.removed, FileStatus::Removed),
            ] {
                for entry in entries {
                    changes.insert(RelativeFile::new(archive, entry), status);
                }
            }
            Ok(changes)
        }
    }
}

/// Computes per-file changes for single containers against a shared cache.
///
/// This is the eager form of what [`MergeInput::delta_contents`] does
/// lazily; it reads the cache but never modifies it.
///
/// [`MergeInput::delta_contents`]: crate::MergeInput::delta_contents
#[derive(Debug, Clone)]
pub struct ChangeSetComputer {
    cache: Arc<ArchiveDirectoryCache>,
}

impl ChangeSetComputer {
    /// Creates a computer reading prior snapshots from `cache`.
    pub fn new(cache: Arc<ArchiveDirectoryCache>) -> Self {
        Self { cache }
    }

    /// Computes what changed inside `path`, reported with `status`.
    ///
    /// `change_map` supplies per-file statuses for directory containers and
    /// is ignored for archives.
    pub fn compute(
        &self,
        path: &Path,
        status: Option<FileStatus>,
        change_map: &ChangeMap,
    ) -> Result<FileChanges, MergeError> {
        match ContainerKind::detect(path, &self.cache) {
            ContainerKind::Directory => directory_changes(path, status, change_map),
            ContainerKind::Archive => {
                let previous = self.cache.get(path);
                let current = match status {
                    None => archive_snapshot(path, &self.cache)?,
                    Some(_) => scan_archive(path)?,
                };
                archive_changes(
                    path,
                    status,
                    previous.as_deref(),
                    current.as_deref(),
                    self.cache.mode(),
                )
            }
        }
    }
}
