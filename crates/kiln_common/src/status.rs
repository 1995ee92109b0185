//! Change classification of inputs and of the files inside them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a top-level input, or one file inside it, differs from the previous build.
///
/// The surrounding build framework reports one `FileStatus` per changed input
/// path; the change set computer expands that into one `FileStatus` per
/// [`RelativeFile`](crate::RelativeFile).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// The file did not exist in the previous build.
    New,
    /// The file existed before and its content changed.
    Changed,
    /// The file existed before and is gone now.
    Removed,
}

impl FileStatus {
    /// Returns `true` for statuses whose file still has content to merge.
    pub fn has_content(self) -> bool {
        !matches!(self, FileStatus::Removed)
    }

    /// Lowercase name used in logs, reports, and the `--changed` CLI flag.
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::New => "new",
            FileStatus::Changed => "changed",
            FileStatus::Removed => "removed",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a [`FileStatus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFileStatusError {
    /// The rejected input.
    pub input: String,
}

impl fmt::Display for ParseFileStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid file status '{}' (expected new, changed or removed)",
            self.input
        )
    }
}

impl std::error::Error for ParseFileStatusError {}

impl FromStr for FileStatus {
    type Err = ParseFileStatusError;

    /// Accepts `new`/`added`, `changed`/`modified` and `removed`/`deleted`,
    /// case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" | "added" => Ok(FileStatus::New),
            "changed" | "modified" => Ok(FileStatus::Changed),
            "removed" | "deleted" => Ok(FileStatus::Removed),
            _ => Err(ParseFileStatusError {
                input: s.to_string(),
            }),
        }
    }
}
