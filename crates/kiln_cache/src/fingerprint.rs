//! Cheap change-detecting summaries of archive entries and archive files.

use std::fs::Metadata;
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

/// Which fields of an [`EntryFingerprint`] decide whether an entry changed.
///
/// Both modes read only the central directory. `SizeAndTime` trusts the
/// entry's DOS timestamp, which has two-second resolution and is often
/// normalized by reproducible-build tooling, so an edit that keeps size and
/// timestamp goes unnoticed. `Checksum` compares the CRC-32 recorded for the
/// entry instead and catches those edits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FingerprintMode {
    /// Compare uncompressed size and modification time.
    #[default]
    SizeAndTime,
    /// Compare uncompressed size and CRC-32.
    Checksum,
}

/// Central-directory metadata of one archive entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryFingerprint {
    /// Uncompressed size in bytes.
    pub size: u64,
    /// Compressed size in bytes.
    pub compressed_size: u64,
    /// CRC-32 of the uncompressed content.
    pub crc32: u32,
    /// DOS date (high 16 bits) and time (low 16 bits); zero when absent.
    pub modified: u32,
}

impl EntryFingerprint {
    /// Returns `true` if `other` describes the same content under `mode`.
    pub fn matches(&self, other: &EntryFingerprint, mode: FingerprintMode) -> bool {
        match mode {
            FingerprintMode::SizeAndTime => {
                self.size == other.size && self.modified == other.modified
            }
            FingerprintMode::Checksum => self.size == other.size && self.crc32 == other.crc32,
        }
    }

    /// Packs a zip timestamp into the `modified` field layout.
    pub fn pack_time(time: Option<zip::DateTime>) -> u32 {
        time.map_or(0, |t| (u32::from(t.datepart()) << 16) | u32::from(t.timepart()))
    }
}

/// Length and modification time of an archive file itself.
///
/// A cached snapshot is only reused for indexing while the stamp recorded at
/// scan time still matches the file on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArchiveStamp {
    /// File length in bytes.
    pub len: u64,
    /// Seconds since the Unix epoch of the last modification.
    pub modified_secs: u64,
    /// Sub-second part of the last modification, in nanoseconds.
    pub modified_nanos: u32,
}

impl ArchiveStamp {
    /// Reads the stamp of `path`, or `None` if it cannot be stat'ed.
    pub fn read(path: &Path) -> Option<Self> {
        std::fs::metadata(path).ok().map(|meta| Self::from_metadata(&meta))
    }

    /// Builds the stamp from already-fetched metadata.
    pub fn from_metadata(meta: &Metadata) -> Self {
        let since_epoch = meta
            .modified()
            .ok()
            .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
            .unwrap_or_default();
        Self {
            len: meta.len(),
            modified_secs: since_epoch.as_secs(),
            modified_nanos: since_epoch.subsec_nanos(),
        }
    }
}
