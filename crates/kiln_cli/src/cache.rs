//! The `kiln cache` commands.

use kiln_cache::{ArchiveDirectoryCache, SnapshotStore};
use serde::Serialize;

use crate::pipeline::load_project;
use crate::{GlobalArgs, ReportFormat};

#[derive(Debug, Serialize)]
struct CacheReport {
    cache_file: String,
    archives: Vec<CachedArchive>,
}

#[derive(Debug, Serialize)]
struct CachedArchive {
    path: String,
    entries: usize,
}

/// Runs `kiln cache show`.
pub fn show(format: ReportFormat, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = load_project(global)?;
    let store = SnapshotStore::new(&project.paths.cache_dir);
    let cache =
        ArchiveDirectoryCache::load(&project.paths.cache_dir, project.config.merge.fingerprint)
            .unwrap_or_default();

    let report = CacheReport {
        cache_file: store.path().display().to_string(),
        archives: cache
            .archives()
            .into_iter()
            .map(|path| CachedArchive {
                entries: cache.get(&path).map_or(0, |snapshot| snapshot.len()),
                path: path.display().to_string(),
            })
            .collect(),
    };

    match format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        ReportFormat::Text => {
            if report.archives.is_empty() {
                println!("no cached archives in {}", report.cache_file);
            }
            for archive in &report.archives {
                println!("{:>8}  {}", archive.entries, archive.path);
            }
        }
    }
    Ok(0)
}

/// Runs `kiln cache clear`.
pub fn clear(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = load_project(global)?;
    let store = SnapshotStore::new(&project.paths.cache_dir);
    let removed = store.remove()?;
    if !global.quiet {
        if removed {
            println!("removed {}", store.path().display());
        } else {
            println!("no archive cache at {}", store.path().display());
        }
    }
    Ok(0)
}
