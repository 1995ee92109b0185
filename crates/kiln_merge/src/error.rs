//! Error types for building and running merges.

use std::path::PathBuf;

use kiln_cache::CacheError;

/// Errors surfaced while resolving merge inputs, writing, or updating the cache.
///
/// None of these are retried internally. Any error raised before the writer
/// succeeds leaves the archive cache exactly as it was.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// The merge was requested in a way that cannot be honored, such as an
    /// incremental merge without a change map.
    #[error("invalid merge configuration: {reason}")]
    Configuration {
        /// What was wrong with the request.
        reason: String,
    },

    /// An archive could not be opened or its central directory is malformed.
    #[error("cannot read archive {path}: {source}")]
    ArchiveRead {
        /// The archive that failed.
        path: PathBuf,
        /// The underlying cache or zip error.
        source: CacheError,
    },

    /// An archive was reported REMOVED but the cache holds no snapshot of it,
    /// so its previous entries are unknown. The cache and the change
    /// reporting have gone out of sync.
    #[error("no cached snapshot for removed archive {archive}; cache is out of sync with reported changes")]
    StaleCache {
        /// The archive reported as removed.
        archive: PathBuf,
    },

    /// A directory could not be walked.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The output writer reported a failure.
    #[error("merge writer failed: {source}")]
    Writer {
        /// The writer's error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A deferred cache action failed after the writer succeeded. Actions
    /// applied before the failing one are not rolled back.
    #[error("cache update '{action}' failed: {source}")]
    CacheUpdate {
        /// Description of the failing action.
        action: String,
        /// The underlying cache error.
        source: CacheError,
    },
}

impl From<CacheError> for MergeError {
    fn from(source: CacheError) -> Self {
        let path = source.path().map(PathBuf::from).unwrap_or_default();
        MergeError::ArchiveRead { path, source }
    }
}
