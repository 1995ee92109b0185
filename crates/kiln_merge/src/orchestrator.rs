//! Top-level merge driver.
//!
//! A merge moves through the phases of [`MergePhase`] in order. Failing
//! before [`MergePhase::WriterSucceeded`] leaves the archive cache untouched;
//! the deferred actions of a merge are applied only after its writer reports
//! success.

use std::error::Error;
use std::sync::Arc;

use kiln_cache::ArchiveDirectoryCache;

use crate::action::apply_deferred_actions;
use crate::builder::{ChangeMap, MergeInputBuilder, MergeInputs, MergeSource};
use crate::error::MergeError;

/// The stage that turns resolved inputs into physical output.
pub trait MergeWriter {
    /// Returns `true` if the writer cannot apply deltas, for example because
    /// its output is missing. The merge then runs as a full rebuild.
    fn needs_full_rebuild(&self) -> bool {
        false
    }

    /// Writes the merged output for `inputs`.
    ///
    /// Returning an error aborts the merge without touching the cache. A
    /// [`MergeError`] raised while reading input views is passed through
    /// unchanged.
    fn write(&mut self, inputs: &MergeInputs) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// What to merge and how.
#[derive(Clone, Debug, Default)]
pub struct MergeRequest {
    /// Containers to merge, in priority order.
    pub sources: Vec<MergeSource>,
    /// Changes since the last successful merge; required unless
    /// `full_rebuild` is set.
    pub change_map: Option<ChangeMap>,
    /// Ignore previous state and treat every input as new.
    pub full_rebuild: bool,
}

impl MergeRequest {
    /// A full rebuild of `sources`.
    pub fn full(sources: Vec<MergeSource>) -> Self {
        Self {
            sources,
            change_map: None,
            full_rebuild: true,
        }
    }

    /// An incremental merge of `sources` given what changed.
    pub fn incremental(sources: Vec<MergeSource>, change_map: ChangeMap) -> Self {
        Self {
            sources,
            change_map: Some(change_map),
            full_rebuild: false,
        }
    }
}

/// Phases of one merge invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergePhase {
    /// The request has been accepted.
    Built,
    /// Inputs and deferred actions are being resolved.
    ResolvingInputs,
    /// Every input has been resolved.
    InputsReady,
    /// The writer is running.
    DelegatedToWriter,
    /// The writer reported success.
    WriterSucceeded,
    /// All deferred actions have been applied.
    CacheUpdated,
    /// The merge finished.
    Done,
}

/// Summary of a successful merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Whether the merge ran as a full rebuild.
    pub full_rebuild: bool,
    /// Number of inputs handed to the writer.
    pub inputs: usize,
    /// Number of cache actions applied.
    pub actions_applied: usize,
    /// Phases passed through, in order.
    pub phases: Vec<MergePhase>,
}

/// Runs merges against a shared archive cache.
#[derive(Debug, Clone)]
pub struct IncrementalMerge {
    cache: Arc<ArchiveDirectoryCache>,
    prefetch: bool,
    retire_unlisted: bool,
}

impl IncrementalMerge {
    /// Creates a driver using `cache`.
    pub fn new(cache: Arc<ArchiveDirectoryCache>) -> Self {
        Self {
            cache,
            prefetch: false,
            retire_unlisted: false,
        }
    }

    /// Resolves all input views before the writer runs.
    pub fn prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Reports cached archives missing from the sources as removed. See
    /// [`MergeInputBuilder::retire_unlisted`].
    pub fn retire_unlisted(mut self, retire: bool) -> Self {
        self.retire_unlisted = retire;
        self
    }

    /// The cache this driver reads and updates.
    pub fn cache(&self) -> &Arc<ArchiveDirectoryCache> {
        &self.cache
    }

    /// Runs one merge through `writer`.
    pub fn run<W: MergeWriter + ?Sized>(
        &self,
        request: &MergeRequest,
        writer: &mut W,
    ) -> Result<MergeOutcome, MergeError> {
        let span = tracing::info_span!("merge", sources = request.sources.len());
        let _enter = span.enter();

        let mut phases = Vec::new();
        enter(&mut phases, MergePhase::Built);

        let full_rebuild = request.full_rebuild || writer.needs_full_rebuild();
        if full_rebuild && !request.full_rebuild {
            tracing::info!("writer requested a full rebuild");
        }

        enter(&mut phases, MergePhase::ResolvingInputs);
        let inputs = MergeInputBuilder::new(Arc::clone(&self.cache))
            .prefetch(self.prefetch)
            .retire_unlisted(self.retire_unlisted)
            .build(&request.sources, request.change_map.as_ref(), full_rebuild)?;
        enter(&mut phases, MergePhase::InputsReady);
        tracing::info!(
            inputs = inputs.len(),
            actions = inputs.actions().len(),
            full_rebuild,
            "inputs ready"
        );

        enter(&mut phases, MergePhase::DelegatedToWriter);
        writer.write(&inputs).map_err(writer_error)?;
        enter(&mut phases, MergePhase::WriterSucceeded);

        let actions_applied = apply_deferred_actions(inputs.actions(), &self.cache)?;
        enter(&mut phases, MergePhase::CacheUpdated);
        tracing::info!(actions = actions_applied, "cache updated");

        enter(&mut phases, MergePhase::Done);
        Ok(MergeOutcome {
            full_rebuild,
            inputs: inputs.len(),
            actions_applied,
            phases,
        })
    }
}

fn enter(phases: &mut Vec<MergePhase>, phase: MergePhase) {
    tracing::debug!(?phase, "merge phase");
    phases.push(phase);
}

fn writer_error(err: Box<dyn Error + Send + Sync>) -> MergeError {
    match err.downcast::<MergeError>() {
        Ok(merge) => *merge,
        Err(source) => MergeError::Writer { source },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_common::FileStatus;
    use std::fs::File;
    use std::io::Write;
    use std::path::Path;
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

    #[derive(Default)]
    struct RecordingWriter {
        fail: bool,
        wants_full: bool,
        seen: Vec<(String, usize)>,
    }

    impl MergeWriter for RecordingWriter {
        fn needs_full_rebuild(&self) -> bool {
            self.wants_full
        }

        fn write(&mut self, inputs: &MergeInputs) -> Result<(), Box<dyn Error + Send + Sync>> {
            for input in inputs.iter() {
                let delta = input.delta_contents()?;
                self.seen.push((input.name().to_string(), delta.len()));
            }
            if self.fail {
                return Err("output volume is read-only".into());
            }
            Ok(())
        }
    }

    #[test]
    fn successful_merge_walks_every_phase() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("lib.jar");
        write_archive(&jar, &["a", "b"]);
        let cache = Arc::new(ArchiveDirectoryCache::default());

        let mut writer = RecordingWriter::default();
        let outcome = IncrementalMerge::new(Arc::clone(&cache))
            .run(
                &MergeRequest::full(vec![MergeSource::new(&jar, "libs")]),
                &mut writer,
            )
            .unwrap();

        assert_eq!(
            outcome.phases,
            vec![
                MergePhase::Built,
                MergePhase::ResolvingInputs,
                MergePhase::InputsReady,
                MergePhase::DelegatedToWriter,
                MergePhase::WriterSucceeded,
                MergePhase::CacheUpdated,
                MergePhase::Done,
            ]
        );
        assert_eq!(outcome.actions_applied, 2);
        assert_eq!(writer.seen, vec![(jar.display().to_string(), 2)]);
        assert_eq!(cache.get(&jar).unwrap().len(), 2);
    }

    #[test]
    fn writer_failure_leaves_cache_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("lib.jar");
        write_archive(&jar, &["a"]);
        let cache = Arc::new(ArchiveDirectoryCache::default());

        let mut writer = RecordingWriter {
            fail: true,
            ..Default::default()
        };
        let err = IncrementalMerge::new(Arc::clone(&cache))
            .run(
                &MergeRequest::full(vec![MergeSource::new(&jar, "libs")]),
                &mut writer,
            )
            .unwrap_err();
        assert!(matches!(err, MergeError::Writer { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn view_errors_pass_through_writer() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("bad.jar");
        std::fs::write(&jar, b"garbage").unwrap();
        let cache = Arc::new(ArchiveDirectoryCache::default());

        let err = IncrementalMerge::new(cache)
            .run(
                &MergeRequest::full(vec![MergeSource::new(&jar, "libs")]),
                &mut RecordingWriter::default(),
            )
            .unwrap_err();
        assert!(matches!(err, MergeError::ArchiveRead { .. }));
    }

    #[test]
    fn writer_can_force_full_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let cache = Arc::new(ArchiveDirectoryCache::default());

        let mut writer = RecordingWriter {
            wants_full: true,
            ..Default::default()
        };
        let request = MergeRequest::incremental(
            vec![MergeSource::new(dir.path(), "project")],
            ChangeMap::new(),
        );
        let outcome = IncrementalMerge::new(cache).run(&request, &mut writer).unwrap();
        assert!(outcome.full_rebuild);
        assert_eq!(writer.seen[0].1, 1);
    }

    #[test]
    fn incremental_merge_without_changes_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let classes = dir.path().join("classes");
        std::fs::create_dir(&classes).unwrap();
        std::fs::write(classes.join("a.txt"), "a").unwrap();
        let mut change_map = ChangeMap::new();
        change_map.insert(dir.path().join("resources/b.txt"), FileStatus::New);

        let mut writer = RecordingWriter::default();
        let request =
            MergeRequest::incremental(vec![MergeSource::new(&classes, "project")], change_map);
        let outcome = IncrementalMerge::new(Arc::new(ArchiveDirectoryCache::default()))
            .run(&request, &mut writer)
            .unwrap();
        assert!(!outcome.full_rebuild);
        assert_eq!(outcome.actions_applied, 0);
        assert_eq!(writer.seen, vec![(classes.display().to_string(), 0)]);
    }
}
