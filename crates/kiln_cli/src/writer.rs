//! Writes merged inputs into a plain output directory.

use std::error::Error;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use kiln_common::FileStatus;
use kiln_merge::{MergeInput, MergeInputs, MergeWriter};
use serde::Serialize;

/// Counters for one write.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct WriteStats {
    /// Files copied or extracted into the output.
    pub written: usize,
    /// Files deleted from the output.
    pub removed: usize,
    /// Whether the output directory was wiped first.
    pub wiped: bool,
}

/// A [`MergeWriter`] that mirrors every merged file into `output`.
///
/// Inputs are applied in order, so when two inputs provide the same relative
/// path the later one wins. Removing a path deletes it from the output even if
/// an earlier input still provides it; such overlaps resolve on the next full
/// rebuild. Archives retired from the inputs arrive as inputs whose entries
/// are all removed, so their files are deleted like any other removal.
pub struct DirectoryWriter {
    output: PathBuf,
    stats: WriteStats,
}

impl DirectoryWriter {
    /// Creates a writer targeting `output`.
    pub fn new(output: PathBuf) -> Self {
        Self {
            output,
            stats: WriteStats::default(),
        }
    }

    /// Counters accumulated by the last write.
    pub fn stats(&self) -> &WriteStats {
        &self.stats
    }

    fn write_input(&mut self, input: &MergeInput) -> Result<(), Box<dyn Error + Send + Sync>> {
        let delta = input.delta_contents()?;
        let needs_content = delta.values().any(|status| status.has_content());
        let mut archive = None;
        if needs_content {
            if let Some(listing) = input.archive_listing()? {
                archive = Some((zip::ZipArchive::new(File::open(input.path())?)?, listing));
            }
        }

        for (file, status) in delta.iter() {
            let target = output_path(&self.output, file.relative_path())?;
            match status {
                FileStatus::Removed => {
                    if remove_if_exists(&target)? {
                        self.stats.removed += 1;
                    }
                }
                FileStatus::New | FileStatus::Changed => {
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    match archive.as_mut() {
                        Some((archive, listing)) => {
                            let mut entry =
                                archive.by_name(listing.raw_name(file.relative_path()))?;
                            io::copy(&mut entry, &mut File::create(&target)?)?;
                        }
                        None => {
                            std::fs::copy(file.disk_path(), &target)?;
                        }
                    }
                    self.stats.written += 1;
                }
            }
        }
        tracing::debug!(input = input.name(), changes = delta.len(), "wrote input");
        Ok(())
    }
}

impl MergeWriter for DirectoryWriter {
    fn needs_full_rebuild(&self) -> bool {
        !self.output.is_dir()
    }

    fn write(&mut self, inputs: &MergeInputs) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.stats = WriteStats::default();
        if inputs.is_full_rebuild() && self.output.exists() {
            std::fs::remove_dir_all(&self.output)?;
            self.stats.wiped = true;
        }
        std::fs::create_dir_all(&self.output)?;

        for input in inputs.iter() {
            self.write_input(input)?;
        }
        Ok(())
    }
}

/// Maps an entry path to its location under `root`, rejecting paths that
/// would escape it.
fn output_path(root: &Path, relative: &str) -> io::Result<PathBuf> {
    let mut path = root.to_path_buf();
    for part in relative.split('/') {
        if part.is_empty() || part == "." || part == ".." || part.contains('\\') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("refusing to write unsafe entry path '{relative}'"),
            ));
        }
        path.push(part);
    }
    Ok(path)
}

fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
