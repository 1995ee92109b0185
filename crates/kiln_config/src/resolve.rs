//! Resolving configured paths against the project directory.

use crate::types::{InputKind, KilnConfig};
use kiln_common::ScopeTag;
use std::path::{Path, PathBuf};

/// One configured input with its path made absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInput {
    /// Absolute container path.
    pub path: PathBuf,
    /// Scope label from the configuration.
    pub scope: ScopeTag,
    /// Explicit kind, if one was configured.
    pub kind: Option<InputKind>,
}

/// Output and cache locations resolved against the project directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    /// Directory the merged files are written to.
    pub output: PathBuf,
    /// Directory holding the persisted archive cache.
    pub cache_dir: PathBuf,
}

impl ResolvedPaths {
    /// Resolves the `[merge]` paths of `config` against `project_dir`.
    pub fn new(config: &KilnConfig, project_dir: &Path) -> Self {
        Self {
            output: project_dir.join(&config.merge.output),
            cache_dir: project_dir.join(&config.merge.cache_dir),
        }
    }
}

/// Resolves every configured input against `project_dir`, in declaration order.
///
/// Absolute input paths are kept as they are.
pub fn resolve_inputs(config: &KilnConfig, project_dir: &Path) -> Vec<ResolvedInput> {
    config
        .inputs
        .iter()
        .map(|input| ResolvedInput {
            path: project_dir.join(&input.path),
            scope: ScopeTag::new(input.scope.as_str()),
            kind: input.kind,
        })
        .collect()
}
