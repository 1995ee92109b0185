//! Cache mutations recorded while building inputs and applied after a
//! successful write.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use kiln_cache::{ArchiveDirectoryCache, CacheError};

use crate::error::MergeError;

/// One pending change to the archive cache.
///
/// The variant order is the application order: [`Clear`](Self::Clear)
/// first, then every [`Remove`](Self::Remove), then every [`Add`](Self::Add).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeferredAction {
    /// Discard every snapshot.
    Clear,
    /// Discard the snapshot of one archive.
    Remove(PathBuf),
    /// Scan one archive and record its snapshot.
    Add(PathBuf),
}

impl DeferredAction {
    /// The archive this action targets, if any.
    pub fn archive(&self) -> Option<&Path> {
        match self {
            DeferredAction::Clear => None,
            DeferredAction::Remove(path) | DeferredAction::Add(path) => Some(path),
        }
    }

    fn apply(&self, cache: &ArchiveDirectoryCache) -> Result<(), CacheError> {
        match self {
            DeferredAction::Clear => cache.clear(),
            DeferredAction::Remove(path) => cache.remove(path),
            DeferredAction::Add(path) => {
                cache.add(path)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for DeferredAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeferredAction::Clear => write!(f, "clear"),
            DeferredAction::Remove(path) => write!(f, "remove {}", path.display()),
            DeferredAction::Add(path) => write!(f, "add {}", path.display()),
        }
    }
}

/// An ordered, duplicate-free set of pending cache actions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeferredActions {
    actions: BTreeSet<DeferredAction>,
}

impl DeferredActions {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an action. Recording the same action twice keeps one.
    pub fn push(&mut self, action: DeferredAction) {
        self.actions.insert(action);
    }

    /// Iterates actions in application order.
    pub fn iter(&self) -> impl Iterator<Item = &DeferredAction> {
        self.actions.iter()
    }

    /// Number of distinct actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl FromIterator<DeferredAction> for DeferredActions {
    fn from_iter<I: IntoIterator<Item = DeferredAction>>(iter: I) -> Self {
        Self {
            actions: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a DeferredActions {
    type Item = &'a DeferredAction;
    type IntoIter = std::collections::btree_set::Iter<'a, DeferredAction>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}

/// Applies `actions` to `cache` in order and returns how many were applied.
///
/// Must only be called once the merge output has been written. Stops at the
/// first failing action; actions applied before it are not rolled back.
pub fn apply_deferred_actions(
    actions: &DeferredActions,
    cache: &ArchiveDirectoryCache,
) -> Result<usize, MergeError> {
    let mut applied = 0;
    for action in actions {
        action
            .apply(cache)
            .map_err(|source| MergeError::CacheUpdate {
                action: action.to_string(),
                source,
            })?;
        tracing::debug!(%action, "applied cache action");
        applied += 1;
    }
    Ok(applied)
}
