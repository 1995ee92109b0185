//! Central-directory listings of archives and the differences between them.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::fingerprint::{ArchiveStamp, EntryFingerprint, FingerprintMode};

/// The listing of one archive as of its last scan: every leaf entry path and
/// its fingerprint, plus the stamp of the archive file when it was read.
///
/// Directory entries (names ending in `/`) are never recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveDirectorySnapshot {
    /// Stamp of the archive file at scan time.
    pub stamp: ArchiveStamp,

    /// Entry path (normalized to `/` separators) to fingerprint.
    pub entries: BTreeMap<String, EntryFingerprint>,

    /// Raw central-directory names of entries whose name was changed by
    /// normalization, keyed by the normalized path.
    pub raw_names: BTreeMap<String, String>,
}

impl ArchiveDirectorySnapshot {
    /// Reads the central directory of the archive at `path`.
    ///
    /// Entry contents are never decompressed. Fails with
    /// [`CacheError::Io`] if the file cannot be opened and with
    /// [`CacheError::ArchiveRead`] if it is not a readable zip archive.
    pub fn scan(path: &Path) -> Result<Self, CacheError> {
        let io_err = |source: std::io::Error| CacheError::Io {
            path: path.to_path_buf(),
            source,
        };
        let read_err = |e: zip::result::ZipError| CacheError::ArchiveRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let file = File::open(path).map_err(io_err)?;
        let stamp = ArchiveStamp::from_metadata(&file.metadata().map_err(io_err)?);
        let mut archive = zip::ZipArchive::new(file).map_err(read_err)?;

        let mut entries = BTreeMap::new();
        let mut raw_names = BTreeMap::new();
        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index).map_err(read_err)?;
            if entry.is_dir() {
                continue;
            }
            let name = normalize_entry_name(entry.name());
            if name.is_empty() {
                continue;
            }
            if name != entry.name() {
                raw_names.insert(name.clone(), entry.name().to_string());
            }
            entries.insert(
                name,
                EntryFingerprint {
                    size: entry.size(),
                    compressed_size: entry.compressed_size(),
                    crc32: entry.crc32(),
                    modified: EntryFingerprint::pack_time(entry.last_modified()),
                },
            );
        }

        tracing::debug!(archive = %path.display(), entries = entries.len(), "scanned central directory");
        Ok(Self {
            stamp,
            entries,
            raw_names,
        })
    }

    /// Returns `true` if the archive on disk still carries the stamp this
    /// snapshot was taken from.
    pub fn is_current(&self, path: &Path) -> bool {
        ArchiveStamp::read(path).is_some_and(|stamp| stamp == self.stamp)
    }

    /// The name `entry` is stored under in the archive itself, for looking
    /// the entry up when extracting it.
    pub fn raw_name<'a>(&'a self, entry: &'a str) -> &'a str {
        self.raw_names.get(entry).map_or(entry, String::as_str)
    }

    /// Iterates entry paths in sorted order.
    pub fn entry_paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of leaf entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the archive has no leaf entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compares this (current) listing against a `previous` one.
    ///
    /// Entries only in `self` are added, entries in both whose fingerprints
    /// differ under `mode` are changed, and entries only in `previous` are
    /// removed. Unchanged entries appear in none of the lists.
    pub fn diff_from(
        &self,
        previous: &ArchiveDirectorySnapshot,
        mode: FingerprintMode,
    ) -> SnapshotDiff {
        let mut diff = SnapshotDiff::default();

        for (name, current) in &self.entries {
            match previous.entries.get(name) {
                None => diff.added.push(name.clone()),
                Some(before) if !before.matches(current, mode) => diff.changed.push(name.clone()),
                Some(_) => {}
            }
        }

        diff.removed = previous
            .entries
            .keys()
            .filter(|name| !self.entries.contains_key(*name))
            .cloned()
            .collect();

        diff
    }
}

/// Normalizes an entry name to the `/`-separated, relative form used as key.
fn normalize_entry_name(raw: &str) -> String {
    raw.replace('\\', "/").trim_start_matches('/').to_string()
}

/// Entry-level differences between two listings of the same archive.
///
/// Each list is sorted because it is built from ordered maps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// Entries present now but not before.
    pub added: Vec<String>,

    /// Entries present in both whose fingerprints differ.
    pub changed: Vec<String>,

    /// Entries present before but not now.
    pub removed: Vec<String>,
}

impl SnapshotDiff {
    /// Returns `true` if the two listings are equivalent.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Total number of differing entries.
    pub fn len(&self) -> usize {
        self.added.len() + self.changed.len() + self.removed.len()
    }
}
