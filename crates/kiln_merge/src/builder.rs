//! Turning the caller's inputs and change map into merge inputs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_cache::ArchiveDirectoryCache;
use kiln_common::{FileStatus, ScopeTag};
use rayon::prelude::*;

use crate::action::{DeferredAction, DeferredActions};
use crate::change_set::entries_under;
use crate::error::MergeError;
use crate::index::ContainerKind;
use crate::input::{DeltaSource, MergeInput};

/// Changed paths reported by the build framework since the last successful
/// merge. Keys are either whole containers or individual files inside a
/// directory container.
pub type ChangeMap = BTreeMap<PathBuf, FileStatus>;

/// Scope given to cached archives that no source lists any more.
pub const RETIRED_SCOPE: &str = "retired";

/// A container the caller wants merged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeSource {
    /// Directory or archive path. Relative paths are made absolute against
    /// the current directory.
    pub path: PathBuf,
    /// Opaque label handed back to the writer untouched.
    pub scope: ScopeTag,
    /// Forces the container kind instead of detecting it from disk.
    ///
    /// Detection of a path that no longer exists falls back to the archive
    /// cache and then the file extension. An archive with an unrecognised
    /// extension that was never cached must set this, or its removal is
    /// taken for an empty directory.
    pub kind: Option<ContainerKind>,
}

impl MergeSource {
    /// Creates a source whose kind is detected.
    pub fn new(path: impl Into<PathBuf>, scope: impl Into<ScopeTag>) -> Self {
        Self {
            path: path.into(),
            scope: scope.into(),
            kind: None,
        }
    }

    /// Forces the container kind.
    pub fn with_kind(mut self, kind: ContainerKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// The resolved inputs of one merge plus the cache actions to run once the
/// merge output has been written.
#[derive(Debug)]
pub struct MergeInputs {
    inputs: Vec<MergeInput>,
    scopes: HashMap<String, ScopeTag>,
    actions: DeferredActions,
    full_rebuild: bool,
}

impl MergeInputs {
    /// Inputs in the order their sources were given.
    pub fn inputs(&self) -> &[MergeInput] {
        &self.inputs
    }

    /// Iterates inputs in the order their sources were given.
    pub fn iter(&self) -> impl Iterator<Item = &MergeInput> {
        self.inputs.iter()
    }

    /// Number of inputs.
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    /// Returns `true` if nothing is left to merge.
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// The scope tag `input` was given.
    pub fn scope_of(&self, input: &MergeInput) -> Option<&ScopeTag> {
        self.scopes.get(input.name())
    }

    /// Groups inputs by scope tag, preserving source order within a group.
    pub fn by_scope(&self) -> BTreeMap<&ScopeTag, Vec<&MergeInput>> {
        let mut groups: BTreeMap<&ScopeTag, Vec<&MergeInput>> = BTreeMap::new();
        for input in &self.inputs {
            if let Some(scope) = self.scopes.get(input.name()) {
                groups.entry(scope).or_default().push(input);
            }
        }
        groups
    }

    /// Cache actions to apply after a successful write.
    pub fn actions(&self) -> &DeferredActions {
        &self.actions
    }

    /// Returns `true` if these inputs describe a full rebuild, in which case
    /// every input reports its whole content as new.
    pub fn is_full_rebuild(&self) -> bool {
        self.full_rebuild
    }
}

/// Builds [`MergeInputs`] against a shared archive cache.
///
/// The builder only reads the cache. Every mutation it decides on is
/// recorded as a [`DeferredAction`] in the result.
#[derive(Debug, Clone)]
pub struct MergeInputBuilder {
    cache: Arc<ArchiveDirectoryCache>,
    prefetch: bool,
    retire_unlisted: bool,
}

impl MergeInputBuilder {
    /// Creates a builder that resolves views lazily.
    pub fn new(cache: Arc<ArchiveDirectoryCache>) -> Self {
        Self {
            cache,
            prefetch: false,
            retire_unlisted: false,
        }
    }

    /// Resolves both views of every input while building, in parallel.
    pub fn prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// In incremental merges, treats every cached archive that no source
    /// lists as removed: it gets an input under [`RETIRED_SCOPE`] reporting
    /// all of its previous entries as removed, and is dropped from the cache
    /// once the merge succeeds.
    pub fn retire_unlisted(mut self, retire: bool) -> Self {
        self.retire_unlisted = retire;
        self
    }

    /// Resolves `sources` into merge inputs.
    ///
    /// A full rebuild ignores `change_map`; an incremental one requires it.
    /// Any error discards everything built so far, including recorded
    /// actions.
    pub fn build(
        &self,
        sources: &[MergeSource],
        change_map: Option<&ChangeMap>,
        full_rebuild: bool,
    ) -> Result<MergeInputs, MergeError> {
        let change_map = match (full_rebuild, change_map) {
            (true, _) => None,
            (false, Some(map)) => Some(absolute_change_map(map)?),
            (false, None) => {
                return Err(MergeError::Configuration {
                    reason: "incremental merge requires a change map".to_string(),
                })
            }
        };

        let mut seen = HashSet::new();
        let mut inputs = Vec::with_capacity(sources.len());
        let mut scopes = HashMap::new();
        let mut actions = DeferredActions::new();
        if full_rebuild {
            actions.push(DeferredAction::Clear);
        }

        for source in sources {
            let path = absolute(&source.path)?;
            if !seen.insert(path.clone()) {
                return Err(MergeError::Configuration {
                    reason: format!("input {} is listed more than once", path.display()),
                });
            }
            let kind = source
                .kind
                .unwrap_or_else(|| ContainerKind::detect(&path, &self.cache));

            let input = match &change_map {
                None => self.full_input(path, kind, &mut actions),
                Some(map) => self.incremental_input(path, kind, map, &mut actions)?,
            };
            if let Some(input) = input {
                scopes.insert(input.name().to_string(), source.scope.clone());
                inputs.push(input);
            }
        }

        if self.retire_unlisted && !full_rebuild {
            for archive in self.cache.archives() {
                if seen.contains(&archive) {
                    continue;
                }
                let Some(previous) = self.cache.get(&archive) else {
                    continue;
                };
                tracing::info!(archive = %archive.display(), "retiring archive no longer listed");
                actions.push(DeferredAction::Remove(archive.clone()));
                let input = self.input(
                    archive,
                    ContainerKind::Archive,
                    Some(FileStatus::Removed),
                    DeltaSource::Retired { previous },
                );
                scopes.insert(input.name().to_string(), ScopeTag::new(RETIRED_SCOPE));
                inputs.push(input);
            }
        }

        if self.prefetch {
            inputs.par_iter().try_for_each(MergeInput::prefetch)?;
        }

        tracing::debug!(
            inputs = inputs.len(),
            actions = actions.len(),
            full_rebuild,
            "built merge inputs"
        );
        Ok(MergeInputs {
            inputs,
            scopes,
            actions,
            full_rebuild,
        })
    }

    fn full_input(
        &self,
        path: PathBuf,
        kind: ContainerKind,
        actions: &mut DeferredActions,
    ) -> Option<MergeInput> {
        if !path.exists() {
            tracing::debug!(input = %path.display(), "skipping missing input");
            return None;
        }
        if kind == ContainerKind::Archive {
            actions.push(DeferredAction::Add(path.clone()));
        }
        Some(self.input(path, kind, Some(FileStatus::New), DeltaSource::Everything))
    }

    fn incremental_input(
        &self,
        path: PathBuf,
        kind: ContainerKind,
        change_map: &ChangeMap,
        actions: &mut DeferredActions,
    ) -> Result<Option<MergeInput>, MergeError> {
        let status = change_map.get(&path).copied();
        tracing::debug!(input = %path.display(), ?kind, ?status, "classifying input");

        match kind {
            ContainerKind::Directory => {
                if status == Some(FileStatus::New) {
                    if !path.is_dir() {
                        return Ok(None);
                    }
                    return Ok(Some(self.input(path, kind, status, DeltaSource::Everything)));
                }
                let entries = entries_under(&path, change_map);
                if !path.exists() && entries.is_empty() {
                    if status == Some(FileStatus::Removed) {
                        tracing::warn!(
                            input = %path.display(),
                            "removed input is neither on disk nor cached; \
                             an archive with an unrecognised extension needs an explicit kind"
                        );
                    } else {
                        tracing::debug!(input = %path.display(), "directory vanished with nothing to report");
                    }
                    return Ok(None);
                }
                Ok(Some(self.input(
                    path,
                    kind,
                    status,
                    DeltaSource::DirectoryEntries(entries),
                )))
            }
            ContainerKind::Archive => {
                let exists = path.is_file();
                let previous = self.cache.get(&path);
                match status {
                    Some(FileStatus::New) if !exists => return Ok(None),
                    Some(FileStatus::New) => {
                        actions.push(DeferredAction::Add(path.clone()));
                        return Ok(Some(self.input(path, kind, status, DeltaSource::Everything)));
                    }
                    Some(FileStatus::Removed) | Some(FileStatus::Changed) => {
                        if previous.is_none() && (!exists || status == Some(FileStatus::Removed)) {
                            return Err(MergeError::StaleCache { archive: path });
                        }
                        if exists && status == Some(FileStatus::Changed) {
                            actions.push(DeferredAction::Add(path.clone()));
                        } else {
                            actions.push(DeferredAction::Remove(path.clone()));
                        }
                    }
                    None if !exists => {
                        tracing::debug!(input = %path.display(), "unchanged archive is missing");
                        return Ok(None);
                    }
                    None => {
                        if previous.is_none() {
                            actions.push(DeferredAction::Add(path.clone()));
                        }
                    }
                }
                Ok(Some(self.input(
                    path,
                    kind,
                    status,
                    DeltaSource::ArchiveDiff { previous },
                )))
            }
        }
    }

    fn input(
        &self,
        path: PathBuf,
        kind: ContainerKind,
        status: Option<FileStatus>,
        delta_source: DeltaSource,
    ) -> MergeInput {
        MergeInput::new(path, kind, status, delta_source, Arc::clone(&self.cache))
    }
}

/// Builds merge inputs with a lazily resolving [`MergeInputBuilder`].
pub fn build_merge_inputs(
    sources: &[MergeSource],
    change_map: Option<&ChangeMap>,
    full_rebuild: bool,
    cache: &Arc<ArchiveDirectoryCache>,
) -> Result<MergeInputs, MergeError> {
    MergeInputBuilder::new(Arc::clone(cache)).build(sources, change_map, full_rebuild)
}

fn absolute(path: &Path) -> Result<PathBuf, MergeError> {
    std::path::absolute(path).map_err(|source| MergeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn absolute_change_map(map: &ChangeMap) -> Result<ChangeMap, MergeError> {
    map.iter()
        .map(|(path, status)| Ok((absolute(path)?, *status)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use zip::write::FileOptions;

    fn write_archive(path: &Path, entries: &[&str]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for name in entries {
            let options = FileOptions::<()>::default();
            zip.start_file(*name, options).unwrap();
            zip.write_all(name.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn builder() -> MergeInputBuilder {
        MergeInputBuilder::new(Arc::new(ArchiveDirectoryCache::default()))
    }

    #[test]
    fn incremental_without_change_map_is_configuration_error() {
        let err = builder().build(&[], None, false).unwrap_err();
        assert!(matches!(err, MergeError::Configuration { .. }));
    }

    #[test]
    fn duplicate_sources_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sources = [
            MergeSource::new(dir.path(), "a"),
            MergeSource::new(dir.path(), "b"),
        ];
        let err = builder().build(&sources, None, true).unwrap_err();
        assert!(matches!(err, MergeError::Configuration { .. }));
    }

    #[test]
    fn full_rebuild_clears_once_and_adds_each_archive() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jar");
        let b = dir.path().join("b.jar");
        write_archive(&a, &["x"]);
        write_archive(&b, &["y"]);
        let sources = [
            MergeSource::new(&a, "libs"),
            MergeSource::new(dir.path().join("missing.jar"), "libs"),
            MergeSource::new(&b, "libs"),
            MergeSource::new(dir.path(), "project"),
        ];

        let inputs = builder().build(&sources, None, true).unwrap();
        assert!(inputs.is_full_rebuild());
        assert_eq!(inputs.len(), 3);
        let actions: Vec<_> = inputs.actions().iter().cloned().collect();
        assert_eq!(
            actions,
            vec![
                DeferredAction::Clear,
                DeferredAction::Add(a.clone()),
                DeferredAction::Add(b.clone()),
            ]
        );
    }

    #[test]
    fn scopes_follow_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let classes = dir.path().join("classes");
        let jar = dir.path().join("dep.jar");
        std::fs::create_dir(&classes).unwrap();
        write_archive(&jar, &["d"]);
        let sources = [
            MergeSource::new(&classes, "project"),
            MergeSource::new(&jar, "external"),
        ];

        let inputs = builder().build(&sources, None, true).unwrap();
        let scopes: Vec<&str> = inputs
            .iter()
            .map(|i| inputs.scope_of(i).unwrap().as_str())
            .collect();
        assert_eq!(scopes, vec!["project", "external"]);
        let groups = inputs.by_scope();
        assert_eq!(groups[&ScopeTag::new("external")][0].path(), jar);
    }

    #[test]
    fn removed_archive_without_snapshot_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("gone.jar");
        let mut change_map = ChangeMap::new();
        change_map.insert(jar.clone(), FileStatus::Removed);

        let err = builder()
            .build(&[MergeSource::new(&jar, "libs")], Some(&change_map), false)
            .unwrap_err();
        assert!(matches!(err, MergeError::StaleCache { .. }));
    }

    #[test]
    fn removed_archive_schedules_remove() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("gone.jar");
        write_archive(&jar, &["x"]);
        let cache = Arc::new(ArchiveDirectoryCache::default());
        cache.add(&jar).unwrap();
        std::fs::remove_file(&jar).unwrap();

        let mut change_map = ChangeMap::new();
        change_map.insert(jar.clone(), FileStatus::Removed);
        let inputs = MergeInputBuilder::new(cache)
            .build(&[MergeSource::new(&jar, "libs")], Some(&change_map), false)
            .unwrap();

        assert_eq!(inputs.len(), 1);
        let actions: Vec<_> = inputs.actions().iter().cloned().collect();
        assert_eq!(actions, vec![DeferredAction::Remove(jar)]);
    }

    #[test]
    fn unchanged_uncached_archive_is_warmed_up() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("dep.jar");
        write_archive(&jar, &["x"]);

        let inputs = builder()
            .build(&[MergeSource::new(&jar, "libs")], Some(&ChangeMap::new()), false)
            .unwrap();
        let actions: Vec<_> = inputs.actions().iter().cloned().collect();
        assert_eq!(actions, vec![DeferredAction::Add(jar)]);
        assert!(inputs.inputs()[0].delta_contents().unwrap().is_empty());
    }

    #[test]
    fn vanished_directory_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");
        let mut change_map = ChangeMap::new();
        change_map.insert(gone.clone(), FileStatus::Removed);

        let inputs = builder()
            .build(
                &[MergeSource::new(&gone, "project").with_kind(ContainerKind::Directory)],
                Some(&change_map),
                false,
            )
            .unwrap();
        assert!(inputs.is_empty());
        assert!(inputs.actions().is_empty());
    }

    #[test]
    fn prefetch_surfaces_corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("bad.jar");
        std::fs::write(&jar, b"garbage").unwrap();
        let err = builder()
            .prefetch(true)
            .build(&[MergeSource::new(&jar, "libs")], None, true)
            .unwrap_err();
        assert!(matches!(err, MergeError::ArchiveRead { .. }));
    }

    #[test]
    fn removed_archive_with_unknown_extension_needs_explicit_kind() {
        let dir = tempfile::tempdir().unwrap();
        let deps = dir.path().join("deps.bin");
        let mut change_map = ChangeMap::new();
        change_map.insert(deps.clone(), FileStatus::Removed);

        let detected = builder()
            .build(&[MergeSource::new(&deps, "libs")], Some(&change_map), false)
            .unwrap();
        assert!(detected.is_empty(), "detected as a vanished directory");

        let err = builder()
            .build(
                &[MergeSource::new(&deps, "libs").with_kind(ContainerKind::Archive)],
                Some(&change_map),
                false,
            )
            .unwrap_err();
        match err {
            MergeError::StaleCache { archive } => assert_eq!(archive, deps),
            other => panic!("expected StaleCache, got {other:?}"),
        }
    }

    #[test]
    fn unlisted_cached_archive_is_retired() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("kept.jar");
        let old = dir.path().join("old.jar");
        write_archive(&kept, &["k"]);
        write_archive(&old, &["o1", "o2"]);
        let cache = Arc::new(ArchiveDirectoryCache::default());
        cache.add(&kept).unwrap();
        cache.add(&old).unwrap();

        let sources = [MergeSource::new(&kept, "libs")];
        let inputs = MergeInputBuilder::new(cache)
            .retire_unlisted(true)
            .build(&sources, Some(&ChangeMap::new()), false)
            .unwrap();

        assert_eq!(inputs.len(), 2);
        let actions: Vec<_> = inputs.actions().iter().cloned().collect();
        assert_eq!(actions, vec![DeferredAction::Remove(old.clone())]);

        let retired = &inputs.inputs()[1];
        assert_eq!(retired.path(), old);
        assert_eq!(retired.status(), Some(FileStatus::Removed));
        assert_eq!(inputs.scope_of(retired).unwrap().as_str(), RETIRED_SCOPE);
        assert!(retired.full_contents().unwrap().is_empty());
        let delta = retired.delta_contents().unwrap();
        assert_eq!(delta.len(), 2);
        assert!(delta.values().all(|status| *status == FileStatus::Removed));
    }

    #[test]
    fn unlisted_archive_stays_cached_without_retirement() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.jar");
        write_archive(&old, &["o"]);
        let cache = Arc::new(ArchiveDirectoryCache::default());
        cache.add(&old).unwrap();

        let inputs = MergeInputBuilder::new(Arc::clone(&cache))
            .build(&[], Some(&ChangeMap::new()), false)
            .unwrap();
        assert!(inputs.is_empty());
        assert!(inputs.actions().is_empty());

        let full = MergeInputBuilder::new(cache)
            .retire_unlisted(true)
            .build(&[], None, true)
            .unwrap();
        let actions: Vec<_> = full.actions().iter().cloned().collect();
        assert_eq!(actions, vec![DeferredAction::Clear]);
    }
}
