//! Cross-build cache of archive central-directory listings.
//!
//! Scanning an archive's central directory is cheap compared to reading its
//! entries, but still not free. This crate keeps the last observed listing of
//! every merged archive so an incremental merge can diff an archive's current
//! directory against the previous one, and so a REMOVED archive can still
//! report which entries it used to contribute.

#![warn(missing_docs)]

pub mod cache;
pub mod error;
pub mod fingerprint;
pub mod snapshot;
pub mod store;

pub use cache::ArchiveDirectoryCache;
pub use error::CacheError;
pub use fingerprint::{ArchiveStamp, EntryFingerprint, FingerprintMode};
pub use snapshot::{ArchiveDirectorySnapshot, SnapshotDiff};
pub use store::{SnapshotStore, STORE_FILE};
