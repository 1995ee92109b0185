//! A single container prepared for merging.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_cache::{ArchiveDirectoryCache, ArchiveDirectorySnapshot};
use kiln_common::{FileStatus, RelativeFile};

use crate::builder::ChangeMap;
use crate::change_set::{all_new, archive_changes, directory_entry_changes, FileChanges};
use crate::error::MergeError;
use crate::index::{archive_snapshot, index_directory, scan_archive, snapshot_files, ContainerKind};
use crate::lazy::Memo;

/// How the delta view of an input is derived.
#[derive(Debug)]
pub(crate) enum DeltaSource {
    /// Everything in the container is new: full rebuilds and NEW inputs.
    Everything,
    /// Caller-reported per-file statuses below a directory root.
    DirectoryEntries(ChangeMap),
    /// A diff of the archive against the snapshot cached before this merge.
    ArchiveDiff {
        previous: Option<Arc<ArchiveDirectorySnapshot>>,
    },
    /// A cached archive dropped from the inputs: nothing is left of it and
    /// every previously cached entry is removed.
    Retired {
        previous: Arc<ArchiveDirectorySnapshot>,
    },
}

/// One directory or archive taking part in a merge.
///
/// Both views are computed on first use and memoized for the lifetime of the
/// input, so an archive is scanned at most once however often, and from
/// however many threads, its views are requested.
#[derive(Debug)]
pub struct MergeInput {
    name: String,
    path: PathBuf,
    kind: ContainerKind,
    status: Option<FileStatus>,
    delta_source: DeltaSource,
    cache: Arc<ArchiveDirectoryCache>,
    current: Memo<Option<Arc<ArchiveDirectorySnapshot>>>,
    full: Memo<BTreeSet<RelativeFile>>,
    delta: Memo<FileChanges>,
}

impl MergeInput {
    pub(crate) fn new(
        path: PathBuf,
        kind: ContainerKind,
        status: Option<FileStatus>,
        delta_source: DeltaSource,
        cache: Arc<ArchiveDirectoryCache>,
    ) -> Self {
        Self {
            name: path.display().to_string(),
            path,
            kind,
            status,
            delta_source,
            cache,
            current: Memo::new(),
            full: Memo::new(),
            delta: Memo::new(),
        }
    }

    /// Stable name of the input: its absolute path as a string.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the container.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the container is a directory or an archive.
    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// The top-level status the container was reported with, or `None` if
    /// it was not reported as a unit.
    pub fn status(&self) -> Option<FileStatus> {
        self.status
    }

    /// Every file the container holds now.
    pub fn full_contents(&self) -> Result<Arc<BTreeSet<RelativeFile>>, MergeError> {
        self.full.get_or_try_init(|| {
            if matches!(self.delta_source, DeltaSource::Retired { .. }) {
                return Ok(Arc::new(BTreeSet::new()));
            }
            let files = match self.kind {
                ContainerKind::Directory => index_directory(&self.path)?,
                ContainerKind::Archive => self
                    .current_snapshot()?
                    .map(|snapshot| snapshot_files(&self.path, &snapshot))
                    .unwrap_or_default(),
            };
            Ok(Arc::new(files))
        })
    }

    /// What changed inside the container since the previous build.
    pub fn delta_contents(&self) -> Result<Arc<FileChanges>, MergeError> {
        self.delta.get_or_try_init(|| {
            let changes = match &self.delta_source {
                DeltaSource::Everything => all_new(self.full_contents()?.iter()),
                DeltaSource::DirectoryEntries(entries) => {
                    directory_entry_changes(&self.path, entries)
                }
                DeltaSource::ArchiveDiff { previous } => {
                    let current = self.current_snapshot()?;
                    archive_changes(
                        &self.path,
                        self.status,
                        previous.as_deref(),
                        current.as_deref(),
                        self.cache.mode(),
                    )?
                }
                DeltaSource::Retired { previous } => previous
                    .entry_paths()
                    .map(|entry| (RelativeFile::new(&self.path, entry), FileStatus::Removed))
                    .collect(),
            };
            Ok(Arc::new(changes))
        })
    }

    /// Computes both views now.
    pub fn prefetch(&self) -> Result<(), MergeError> {
        self.full_contents()?;
        self.delta_contents()?;
        Ok(())
    }

    /// The central directory the archive's views are computed from, or
    /// `None` for directories and missing archives.
    pub fn archive_listing(&self) -> Result<Option<Arc<ArchiveDirectorySnapshot>>, MergeError> {
        if self.kind != ContainerKind::Archive
            || matches!(self.delta_source, DeltaSource::Retired { .. })
        {
            return Ok(None);
        }
        self.current_snapshot()
    }

    // Only unreported archives may reuse a cached listing.
    fn current_snapshot(&self) -> Result<Option<Arc<ArchiveDirectorySnapshot>>, MergeError> {
        let current = self.current.get_or_try_init(|| {
            let snapshot = match self.status {
                None => archive_snapshot(&self.path, &self.cache)?,
                Some(_) => scan_archive(&self.path)?,
            };
            Ok::<_, MergeError>(Arc::new(snapshot))
        })?;
        Ok(current.as_ref().clone())
    }
}
