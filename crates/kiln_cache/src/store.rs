//! On-disk persistence of archive snapshots between processes.
//!
//! Snapshots are written to `<cache_dir>/archives.bin` as a single binary
//! file: a 4-byte little-endian header length, a bincode header carrying
//! magic bytes, format version, the writing tool's version and a checksum of
//! the payload, then the bincode payload itself.

use std::io::Write;
use std::path::{Path, PathBuf};

use kiln_common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::snapshot::ArchiveDirectorySnapshot;

/// Magic bytes identifying a kiln snapshot file.
const STORE_MAGIC: [u8; 4] = *b"KILN";

/// Current store format version. Increment on breaking changes to the header
/// or payload layout.
const STORE_FORMAT_VERSION: u32 = 2;

/// Name of the snapshot file within the cache directory.
pub const STORE_FILE: &str = "archives.bin";

/// Header prepended to the persisted snapshot payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreHeader {
    /// Magic bytes: must be `b"KILN"`.
    pub magic: [u8; 4],

    /// Store format version.
    pub format_version: u32,

    /// Version of the tool that wrote the file.
    pub kiln_version: String,

    /// Hash of the payload bytes.
    pub checksum: ContentHash,
}

/// Snapshots read back from disk.
#[derive(Debug, Clone)]
pub struct PersistedSnapshots {
    /// Version of the tool that wrote the file.
    pub kiln_version: String,

    /// Archive path and snapshot pairs.
    pub snapshots: Vec<(PathBuf, ArchiveDirectorySnapshot)>,
}

/// Reads and writes the snapshot file of one cache directory.
pub struct SnapshotStore {
    cache_dir: PathBuf,
}

impl SnapshotStore {
    /// Creates a store rooted at `cache_dir`. Nothing is touched on disk.
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    /// Full path of the snapshot file.
    pub fn path(&self) -> PathBuf {
        self.cache_dir.join(STORE_FILE)
    }

    /// Writes `snapshots`, replacing any previous file atomically.
    ///
    /// The data goes to a temporary file in the cache directory first and is
    /// renamed over the target, so a crash never leaves a half-written file.
    pub fn write(
        &self,
        snapshots: &[(PathBuf, ArchiveDirectorySnapshot)],
        kiln_version: &str,
    ) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.cache_dir).map_err(|e| CacheError::Io {
            path: self.cache_dir.clone(),
            source: e,
        })?;

        let payload = bincode::serde::encode_to_vec(snapshots, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;

        let header = StoreHeader {
            magic: STORE_MAGIC,
            format_version: STORE_FORMAT_VERSION,
            kiln_version: kiln_version.to_string(),
            checksum: ContentHash::from_bytes(&payload),
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;

        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(&payload);

        let target = self.path();
        let io_err = |source: std::io::Error| CacheError::Io {
            path: target.clone(),
            source,
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&self.cache_dir).map_err(io_err)?;
        tmp.write_all(&output).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&target).map_err(|e| io_err(e.error))?;

        tracing::debug!(path = %target.display(), archives = snapshots.len(), "saved archive snapshots");
        Ok(())
    }

    /// Reads the snapshot file, validating its header.
    ///
    /// Returns `None` if the file doesn't exist, the header is invalid, the
    /// format version doesn't match, or the checksum doesn't verify. This is
    /// fail-safe: a damaged file behaves like an empty cache.
    pub fn read(&self) -> Option<PersistedSnapshots> {
        let raw = std::fs::read(self.path()).ok()?;

        if raw.len() < 4 {
            return None;
        }
        let header_len = u32::from_le_bytes(raw[..4].try_into().ok()?) as usize;
        if raw.len() < 4 + header_len {
            return None;
        }

        let (header, _): (StoreHeader, usize) =
            bincode::serde::decode_from_slice(&raw[4..4 + header_len], bincode::config::standard())
                .ok()?;
        if header.magic != STORE_MAGIC || header.format_version != STORE_FORMAT_VERSION {
            tracing::debug!(path = %self.path().display(), "ignoring incompatible snapshot file");
            return None;
        }

        let payload = &raw[4 + header_len..];
        if ContentHash::from_bytes(payload) != header.checksum {
            tracing::warn!(path = %self.path().display(), "snapshot file checksum mismatch, ignoring");
            return None;
        }

        let (snapshots, _): (Vec<(PathBuf, ArchiveDirectorySnapshot)>, usize) =
            bincode::serde::decode_from_slice(payload, bincode::config::standard()).ok()?;

        Some(PersistedSnapshots {
            kiln_version: header.kiln_version,
            snapshots,
        })
    }

    /// Deletes the snapshot file. Returns `false` if there was none.
    pub fn remove(&self) -> Result<bool, CacheError> {
        let path = self.path();
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::Io { path, source: e }),
        }
    }
}
