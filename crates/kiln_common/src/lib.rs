//! Shared value types used across the kiln merging engine.
//!
//! This crate provides the identity of a mergeable file ([`RelativeFile`]),
//! per-file change classification ([`FileStatus`]), caller-defined provenance
//! labels ([`ScopeTag`]), and the content hash used to validate persisted state.

#![warn(missing_docs)]

pub mod hash;
pub mod relative_file;
pub mod scope;
pub mod status;

pub use hash::ContentHash;
pub use relative_file::RelativeFile;
pub use scope::ScopeTag;
pub use status::{FileStatus, ParseFileStatusError};
