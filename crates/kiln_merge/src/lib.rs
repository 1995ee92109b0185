//! Incremental merging of directories and archives into one logical file set.
//!
//! A merge combines many containers (class directories, jars, resource
//! archives) into a single relative-path-keyed view, and reports per-file
//! NEW/CHANGED/REMOVED deltas so the output writer can avoid reprocessing
//! everything on every build.
//!
//! The pieces, leaves first:
//! - [`index`] lists the files a directory or archive currently contains.
//! - [`change_set`] expands one top-level change into per-file changes.
//! - [`input`] wraps a container as a [`MergeInput`] with lazily computed,
//!   memoized full and delta views.
//! - [`builder`] turns the caller's inputs and change map into merge inputs
//!   plus [`DeferredAction`]s for the archive cache.
//! - [`orchestrator`] hands the inputs to a [`MergeWriter`] and applies the
//!   deferred actions only once the writer has succeeded.

#![warn(missing_docs)]

pub mod action;
pub mod builder;
pub mod change_set;
pub mod error;
pub mod index;
pub mod input;
pub mod lazy;
pub mod orchestrator;

pub use action::{apply_deferred_actions, DeferredAction, DeferredActions};
pub use builder::{
    build_merge_inputs, ChangeMap, MergeInputBuilder, MergeInputs, MergeSource, RETIRED_SCOPE,
};
pub use change_set::{ChangeSetComputer, FileChanges};
pub use error::MergeError;
pub use index::{index_archive, index_directory, ContainerKind};
pub use input::MergeInput;
pub use orchestrator::{IncrementalMerge, MergeOutcome, MergePhase, MergeRequest, MergeWriter};
