//! Configuration types deserialized from `kiln.toml`.

use kiln_cache::FingerprintMode;
use serde::Deserialize;

/// The top-level configuration parsed from `kiln.toml`.
#[derive(Debug, Deserialize)]
pub struct KilnConfig {
    /// Output and cache settings.
    pub merge: MergeConfig,
    /// Containers to merge, in priority order: later inputs win when two
    /// provide the same path.
    #[serde(default)]
    pub inputs: Vec<InputConfig>,
}

/// The `[merge]` table.
#[derive(Debug, Deserialize)]
pub struct MergeConfig {
    /// Name of the merged output, used in logs and reports.
    #[serde(default)]
    pub name: String,
    /// Output directory, relative to the project directory.
    #[serde(default)]
    pub output: String,
    /// Directory holding the persisted archive cache.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    /// How archive entries are compared between builds.
    #[serde(default)]
    pub fingerprint: FingerprintMode,
    /// Resolve every input before writing instead of on demand.
    #[serde(default = "default_prefetch")]
    pub prefetch: bool,
}

/// One `[[inputs]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    /// Directory or archive path, relative to the project directory.
    #[serde(default)]
    pub path: String,
    /// Scope label passed through to the output writer.
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Forces the container kind instead of detecting it. Needed for
    /// archives whose extension is not a known archive extension, so that
    /// their removal is still recognised.
    #[serde(default)]
    pub kind: Option<InputKind>,
}

/// Explicit container kind for an input.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// A directory tree.
    Directory,
    /// A zip-format archive.
    Archive,
}

fn default_cache_dir() -> String {
    ".kiln-cache".to_string()
}

fn default_prefetch() -> bool {
    true
}

fn default_scope() -> String {
    "project".to_string()
}
