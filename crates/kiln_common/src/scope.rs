//! Caller-defined provenance labels attached to merge inputs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque label such as `"project"` or `"external-libraries"`.
///
/// The merging engine stores the tag next to each input and hands it back to
/// consumers, which use it to partition their output. The engine never
/// interprets it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeTag(String);

impl ScopeTag {
    /// Creates a tag from any string-like value.
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Returns the label text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScopeTag {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for ScopeTag {
    fn from(label: String) -> Self {
        Self(label)
    }
}
