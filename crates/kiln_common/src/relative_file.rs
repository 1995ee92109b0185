//! Identity of one mergeable file inside a container.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// One leaf file inside a container, identified by the container root and an
/// archive-style relative path.
///
/// The container is either a directory or an archive file. The relative path
/// always uses `/` separators, never starts with `/`, and never names a
/// directory entry. Two values are equal iff both fields are equal, so the
/// same entry path in two different containers is two different files.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelativeFile {
    container: PathBuf,
    path: String,
}

impl RelativeFile {
    /// Creates a relative file, normalizing `\` separators and any leading `/`.
    pub fn new(container: impl Into<PathBuf>, path: impl AsRef<str>) -> Self {
        let path = path.as_ref().replace('\\', "/");
        Self {
            container: container.into(),
            path: path.trim_start_matches('/').to_string(),
        }
    }

    /// Builds the relative file for `file` located somewhere below `root`.
    ///
    /// Returns `None` if `file` is not strictly inside `root` or if the
    /// remaining components cannot be expressed as UTF-8.
    pub fn from_disk(root: &Path, file: &Path) -> Option<Self> {
        let rel = file.strip_prefix(root).ok()?;
        let mut parts = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str()?),
                Component::CurDir => {}
                _ => return None,
            }
        }
        if parts.is_empty() {
            return None;
        }
        Some(Self {
            container: root.to_path_buf(),
            path: parts.join("/"),
        })
    }

    /// The directory or archive this file lives in.
    pub fn container(&self) -> &Path {
        &self.container
    }

    /// The `/`-separated path of the file within its container.
    pub fn relative_path(&self) -> &str {
        &self.path
    }

    /// Location of the file on disk when the container is a directory.
    pub fn disk_path(&self) -> PathBuf {
        self.path
            .split('/')
            .fold(self.container.clone(), |acc, part| acc.join(part))
    }
}

impl fmt::Display for RelativeFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!/{}", self.container.display(), self.path)
    }
}
