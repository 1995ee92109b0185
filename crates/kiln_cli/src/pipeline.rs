//! Shared helpers for CLI commands.
//!
//! Project root resolution, configuration loading, change-list parsing and
//! the mapping from configured inputs to merge sources.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_cache::ArchiveDirectoryCache;
use kiln_common::FileStatus;
use kiln_config::{
    load_config, load_config_file, resolve_inputs, InputKind, KilnConfig, ResolvedPaths,
    CONFIG_FILE,
};
use kiln_merge::{ChangeMap, ContainerKind, MergeSource};

use crate::GlobalArgs;

/// A loaded project: its root directory, configuration and resolved paths.
pub struct Project {
    /// Directory relative config paths are resolved against.
    pub root: PathBuf,
    /// The validated configuration.
    pub config: KilnConfig,
    /// Output and cache directories.
    pub paths: ResolvedPaths,
}

/// Walks up from `start` looking for the nearest directory containing `kiln.toml`.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Loads the project selected by the global CLI args.
///
/// If `--config` names a file, that file is loaded and its directory is the
/// project root. If it names a directory, `kiln.toml` is loaded from there.
/// Otherwise the current directory and its parents are searched.
pub fn load_project(global: &GlobalArgs) -> Result<Project, Box<dyn std::error::Error>> {
    let (root, config) = match global.config {
        Some(ref config_path) => {
            let p = PathBuf::from(config_path);
            if p.is_file() {
                let root = p
                    .parent()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| PathBuf::from("."));
                (root, load_config_file(&p)?)
            } else {
                let config = load_config(&p)?;
                (p, config)
            }
        }
        None => {
            let root = find_project_root(&std::env::current_dir()?)?;
            let config = load_config(&root)?;
            (root, config)
        }
    };
    let root = std::path::absolute(&root)?;
    let paths = ResolvedPaths::new(&config, &root);
    Ok(Project {
        root,
        config,
        paths,
    })
}

/// Turns the configured inputs into merge sources, in declaration order.
pub fn merge_sources(project: &Project) -> Vec<MergeSource> {
    resolve_inputs(&project.config, &project.root)
        .into_iter()
        .map(|input| {
            let source = MergeSource::new(input.path, input.scope);
            match input.kind {
                Some(InputKind::Directory) => source.with_kind(ContainerKind::Directory),
                Some(InputKind::Archive) => source.with_kind(ContainerKind::Archive),
                None => source,
            }
        })
        .collect()
}

/// Parses one `PATH=STATUS` change argument.
///
/// The last `=` separates the path from the status, so paths may contain `=`.
pub fn parse_change(arg: &str) -> Result<(PathBuf, FileStatus), String> {
    let (path, status) = arg
        .rsplit_once('=')
        .ok_or_else(|| format!("invalid change '{arg}': expected PATH=STATUS"))?;
    if path.is_empty() {
        return Err(format!("invalid change '{arg}': empty path"));
    }
    let status = status
        .parse::<FileStatus>()
        .map_err(|e| format!("invalid change '{arg}': {e}"))?;
    Ok((PathBuf::from(path), status))
}

/// Builds the change map from `--changed` arguments, resolving relative
/// paths against the project root. A later entry for the same path wins.
pub fn change_map(args: &[String], root: &Path) -> Result<ChangeMap, Box<dyn std::error::Error>> {
    let mut map = ChangeMap::new();
    for arg in args {
        let (path, status) = parse_change(arg)?;
        map.insert(root.join(path), status);
    }
    Ok(map)
}

/// Loads the persisted archive cache of `project`.
///
/// Returns the cache and whether it was loaded from disk. A missing or
/// unusable cache file yields an empty cache.
pub fn open_cache(project: &Project) -> (Arc<ArchiveDirectoryCache>, bool) {
    let mode = project.config.merge.fingerprint;
    match ArchiveDirectoryCache::load(&project.paths.cache_dir, mode) {
        Some(cache) => (Arc::new(cache), true),
        None => (Arc::new(ArchiveDirectoryCache::new(mode)), false),
    }
}
