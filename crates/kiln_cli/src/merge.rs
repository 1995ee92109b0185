//! The `kiln merge` command.

use std::sync::Arc;

use kiln_merge::{IncrementalMerge, MergeRequest};
use serde::Serialize;

use crate::pipeline::{change_map, load_project, merge_sources, open_cache};
use crate::writer::{DirectoryWriter, WriteStats};
use crate::{GlobalArgs, MergeArgs, ReportFormat};

/// Summary printed after a successful merge.
#[derive(Debug, Serialize)]
struct MergeReport {
    name: String,
    full_rebuild: bool,
    inputs: usize,
    cached_archives: usize,
    #[serde(flatten)]
    stats: WriteStats,
}

/// Runs the `kiln merge` command.
///
/// Merges the configured inputs into the output directory, then saves the
/// archive cache. Runs as a full rebuild when `--full` is given, when no
/// usable cache was persisted, or when the output directory is missing.
/// Archives dropped from the configuration since the last merge are removed
/// from both the output and the cache.
pub fn run(args: &MergeArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = load_project(global)?;
    let (cache, loaded) = open_cache(&project);
    let sources = merge_sources(&project);

    let request = if args.full {
        MergeRequest::full(sources)
    } else if !loaded {
        tracing::info!(
            cache_dir = %project.paths.cache_dir.display(),
            "no usable archive cache; running a full rebuild"
        );
        MergeRequest::full(sources)
    } else {
        MergeRequest::incremental(sources, change_map(&args.changed, &project.root)?)
    };

    let mut writer = DirectoryWriter::new(project.paths.output.clone());
    let outcome = IncrementalMerge::new(Arc::clone(&cache))
        .prefetch(project.config.merge.prefetch)
        .retire_unlisted(true)
        .run(&request, &mut writer)?;
    cache.save(&project.paths.cache_dir)?;

    let report = MergeReport {
        name: project.config.merge.name.clone(),
        full_rebuild: outcome.full_rebuild,
        inputs: outcome.inputs,
        cached_archives: cache.len(),
        stats: writer.stats().clone(),
    };

    match args.format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        ReportFormat::Text if !global.quiet => {
            let mode = if report.full_rebuild {
                "full rebuild"
            } else {
                "incremental"
            };
            println!(
                "merged '{}' ({mode}): {} inputs, {} written, {} removed",
                report.name, report.inputs, report.stats.written, report.stats.removed
            );
            if global.verbose {
                println!(
                    "  output: {}\n  cached archives: {}",
                    project.paths.output.display(),
                    report.cached_archives
                );
            }
        }
        ReportFormat::Text => {}
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::path::Path;
    use zip::write::FileOptions;

    fn write_archive(path: &Path, entries: &[(&str, &str)]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, body) in entries {
            let options = FileOptions::<()>::default();
            zip.start_file(*name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn setup_project(root: &Path) {
        std::fs::write(
            root.join("kiln.toml"),
            r#"
[merge]
name = "app"
output = "out"

[[inputs]]
path = "classes"

[[inputs]]
path = "dep.jar"
scope = "external"
"#,
        )
        .unwrap();
        std::fs::create_dir_all(root.join("classes")).unwrap();
        std::fs::write(root.join("classes/A.class"), "a").unwrap();
        write_archive(&root.join("dep.jar"), &[("x.class", "x"), ("y.class", "y")]);
    }

    fn args(changed: &[&str]) -> MergeArgs {
        MergeArgs {
            full: false,
            changed: changed.iter().map(|s| s.to_string()).collect(),
            format: ReportFormat::Text,
        }
    }

    #[test]
    fn first_merge_is_full_and_persists_cache() {
        let dir = tempfile::tempdir().unwrap();
        setup_project(dir.path());
        let global = GlobalArgs {
            quiet: true,
            verbose: false,
            config: Some(dir.path().display().to_string()),
        };

        assert_eq!(run(&args(&[]), &global).unwrap(), 0);
        let out = dir.path().join("out");
        assert!(out.join("A.class").exists());
        assert!(out.join("x.class").exists());
        assert!(dir.path().join(".kiln-cache/archives.bin").exists());
    }

    #[test]
    fn second_merge_applies_archive_delta() {
        let dir = tempfile::tempdir().unwrap();
        setup_project(dir.path());
        let global = GlobalArgs {
            quiet: true,
            verbose: false,
            config: Some(dir.path().display().to_string()),
        };
        run(&args(&[]), &global).unwrap();

        write_archive(
            &dir.path().join("dep.jar"),
            &[("y.class", "y"), ("z.class", "zz"), ("w.class", "w")],
        );
        run(&args(&["dep.jar=changed"]), &global).unwrap();

        let out = dir.path().join("out");
        assert!(!out.join("x.class").exists());
        assert!(out.join("z.class").exists());
        assert!(out.join("A.class").exists());
    }

    #[test]
    fn archive_dropped_from_config_is_retired() {
        let dir = tempfile::tempdir().unwrap();
        setup_project(dir.path());
        let global = GlobalArgs {
            quiet: true,
            verbose: false,
            config: Some(dir.path().display().to_string()),
        };
        run(&args(&[]), &global).unwrap();
        assert!(dir.path().join("out/x.class").exists());

        std::fs::write(
            dir.path().join("kiln.toml"),
            r#"
[merge]
name = "app"
output = "out"

[[inputs]]
path = "classes"
"#,
        )
        .unwrap();
        run(&args(&[]), &global).unwrap();

        let out = dir.path().join("out");
        assert!(!out.join("x.class").exists());
        assert!(!out.join("y.class").exists());
        assert!(out.join("A.class").exists());
        let cache = kiln_cache::ArchiveDirectoryCache::load(
            &dir.path().join(".kiln-cache"),
            kiln_cache::FingerprintMode::default(),
        )
        .unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn invalid_change_argument_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        setup_project(dir.path());
        let global = GlobalArgs {
            quiet: true,
            verbose: false,
            config: Some(dir.path().display().to_string()),
        };
        run(&args(&[]), &global).unwrap();
        assert!(run(&args(&["dep.jar=touched"]), &global).is_err());
    }
}
