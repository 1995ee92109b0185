//! Error types for cache operations.

use std::path::PathBuf;

/// Errors produced while scanning archives or persisting the cache.
///
/// Loading a persisted cache is fail-safe and never returns these; they
/// surface from scans (`add`, fresh indexing) and from `save`.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading an archive or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The archive could not be opened as a zip file or its central
    /// directory is malformed.
    #[error("failed to read archive {path}: {reason}")]
    ArchiveRead {
        /// The archive that failed to scan.
        path: PathBuf,
        /// Description of the failure reported by the zip reader.
        reason: String,
    },

    /// The cache could not be encoded for persistence.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the encoding failure.
        reason: String,
    },
}

impl CacheError {
    /// The path the error is about, if any.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            CacheError::Io { path, .. } | CacheError::ArchiveRead { path, .. } => Some(path),
            CacheError::Serialization { .. } => None,
        }
    }
}
