//! Shared fixtures for merge integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::error::Error;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use kiln_common::{FileStatus, RelativeFile};
use kiln_merge::{MergeInputs, MergeWriter};
use zip::write::FileOptions;

/// Writes a zip archive at `path` with the given `(name, body)` entries.
///
/// Every entry carries the same fixed timestamp so tests control exactly
/// which fingerprint fields differ between two writes.
pub fn write_archive(path: &Path, entries: &[(&str, &str)]) {
    let stamp = zip::DateTime::from_date_and_time(2024, 1, 1, 12, 0, 0).unwrap();
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, body) in entries {
        let options = FileOptions::<()>::default()
            .compression_method(zip::CompressionMethod::Stored)
            .last_modified_time(stamp);
        zip.start_file(*name, options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// Rewrites an existing archive and moves its modification time forward, so
/// a cached snapshot of the old file is recognized as out of date even when
/// the new file has the same length.
pub fn rewrite_archive(path: &Path, entries: &[(&str, &str)]) {
    let before = std::fs::metadata(path).unwrap().modified().unwrap();
    write_archive(path, entries);
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(before + Duration::from_secs(2))
        .unwrap();
}

/// Rewrites an existing archive and puts its old modification time back.
/// With same-length contents the file keeps its length and mtime stamp.
pub fn rewrite_archive_keeping_stamp(path: &Path, entries: &[(&str, &str)]) {
    let before = std::fs::metadata(path).unwrap().modified().unwrap();
    write_archive(path, entries);
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(before)
        .unwrap();
}

/// Creates files (and their parent directories) below `root`.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (name, body) in files {
        let path = root.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }
}

/// Relative paths of `files`, in order.
pub fn paths(files: &BTreeSet<RelativeFile>) -> Vec<String> {
    files.iter().map(|f| f.relative_path().to_string()).collect()
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

/// A writer that reads every view and records what it saw.
#[derive(Default)]
pub struct CollectingWriter {
    /// Forces a failure after reading the views.
    pub fail: bool,
    /// Every file of every input, as seen by the full view.
    pub full: BTreeSet<RelativeFile>,
    /// Every reported change, across all inputs.
    pub delta: Vec<(RelativeFile, FileStatus)>,
}

impl MergeWriter for CollectingWriter {
    fn write(&mut self, inputs: &MergeInputs) -> Result<(), Box<dyn Error + Send + Sync>> {
        for input in inputs.iter() {
            self.full.extend(input.full_contents()?.iter().cloned());
            for (file, status) in input.delta_contents()?.iter() {
                self.delta.push((file.clone(), *status));
            }
        }
        if self.fail {
            return Err("simulated writer failure".into());
        }
        Ok(())
    }
}
