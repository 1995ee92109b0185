//! The shared, process-scoped archive directory cache.
//!
//! One `ArchiveDirectoryCache` is typically shared (behind an `Arc`) by every
//! merge running in a build session. Lookups take a read lock and hand out
//! `Arc` clones of snapshots, so a snapshot obtained by one merge stays
//! valid even if another merge replaces or removes it afterwards. Mutations
//! are serialized with a dedicated lock, and each `add`, `remove` or `clear`
//! call is atomic with respect to the others.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::CacheError;
use crate::fingerprint::FingerprintMode;
use crate::snapshot::ArchiveDirectorySnapshot;
use crate::store::SnapshotStore;

/// Version string written into persisted snapshot files.
const KILN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Keyed store of archive snapshots.
///
/// Keys are archive paths exactly as supplied by the caller; callers should
/// pass absolute paths so the same archive always maps to the same key.
#[derive(Debug)]
pub struct ArchiveDirectoryCache {
    mode: FingerprintMode,
    snapshots: RwLock<HashMap<PathBuf, Arc<ArchiveDirectorySnapshot>>>,
    mutation: Mutex<()>,
}

impl ArchiveDirectoryCache {
    /// Creates an empty cache that compares entries using `mode`.
    pub fn new(mode: FingerprintMode) -> Self {
        Self {
            mode,
            snapshots: RwLock::new(HashMap::new()),
            mutation: Mutex::new(()),
        }
    }

    /// Loads the snapshots persisted in `cache_dir`.
    ///
    /// Returns `None` if there is no usable snapshot file; see
    /// [`SnapshotStore::read`] for what counts as unusable.
    pub fn load(cache_dir: &Path, mode: FingerprintMode) -> Option<Self> {
        let persisted = SnapshotStore::new(cache_dir).read()?;
        let cache = Self::new(mode);
        {
            let mut map = cache.snapshots.write();
            for (path, snapshot) in persisted.snapshots {
                map.insert(path, Arc::new(snapshot));
            }
        }
        tracing::debug!(
            cache_dir = %cache_dir.display(),
            archives = cache.len(),
            written_by = %persisted.kiln_version,
            "loaded archive cache"
        );
        Some(cache)
    }

    /// Persists every snapshot into `cache_dir`.
    pub fn save(&self, cache_dir: &Path) -> Result<(), CacheError> {
        let mut entries: Vec<(PathBuf, ArchiveDirectorySnapshot)> = self
            .snapshots
            .read()
            .iter()
            .map(|(path, snapshot)| (path.clone(), (**snapshot).clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        SnapshotStore::new(cache_dir).write(&entries, KILN_VERSION)
    }

    /// The fingerprint comparison used when diffing snapshots of this cache.
    pub fn mode(&self) -> FingerprintMode {
        self.mode
    }

    /// Returns the cached snapshot for `archive`, if any. No side effects.
    pub fn get(&self, archive: &Path) -> Option<Arc<ArchiveDirectorySnapshot>> {
        self.snapshots.read().get(archive).cloned()
    }

    /// Returns the cached snapshot for `archive` only if the archive file on
    /// disk still matches the stamp recorded when it was scanned.
    pub fn get_current(&self, archive: &Path) -> Option<Arc<ArchiveDirectorySnapshot>> {
        self.get(archive).filter(|snapshot| snapshot.is_current(archive))
    }

    /// Scans `archive` now and records the result, replacing any previous
    /// snapshot.
    ///
    /// Fails with [`CacheError::ArchiveRead`] (or [`CacheError::Io`]) if the
    /// archive cannot be opened or its directory is corrupt; the cache is
    /// left unchanged in that case.
    pub fn add(&self, archive: &Path) -> Result<Arc<ArchiveDirectorySnapshot>, CacheError> {
        let _guard = self.mutation.lock();
        let snapshot = Arc::new(ArchiveDirectorySnapshot::scan(archive)?);
        self.snapshots
            .write()
            .insert(archive.to_path_buf(), Arc::clone(&snapshot));
        tracing::debug!(archive = %archive.display(), entries = snapshot.len(), "cached archive snapshot");
        Ok(snapshot)
    }

    /// Discards the snapshot for `archive`. A missing snapshot is not an error.
    pub fn remove(&self, archive: &Path) {
        let _guard = self.mutation.lock();
        if self.snapshots.write().remove(archive).is_some() {
            tracing::debug!(archive = %archive.display(), "dropped archive snapshot");
        }
    }

    /// Discards every snapshot.
    pub fn clear(&self) {
        let _guard = self.mutation.lock();
        let mut map = self.snapshots.write();
        tracing::debug!(archives = map.len(), "cleared archive cache");
        map.clear();
    }

    /// Number of cached archives.
    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    /// Returns `true` if no archive is cached.
    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }

    /// Cached archive paths, sorted.
    pub fn archives(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.snapshots.read().keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl Default for ArchiveDirectoryCache {
    fn default() -> Self {
        Self::new(FingerprintMode::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use zip::write::FileOptions;

    fn write_archive(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            let options = FileOptions::<()>::default()
                .compression_method(zip::CompressionMethod::Stored);
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn fresh_cache_is_empty() {
        let cache = ArchiveDirectoryCache::default();
        assert!(cache.is_empty());
        assert_eq!(cache.mode(), FingerprintMode::SizeAndTime);
        assert!(cache.get(Path::new("/nope.jar")).is_none());
    }

    #[test]
    fn add_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("a.jar");
        write_archive(&jar, &[("x.class", b"x"), ("y.class", b"y")]);

        let cache = ArchiveDirectoryCache::default();
        cache.add(&jar).unwrap();

        let snap = cache.get(&jar).unwrap();
        assert_eq!(snap.entry_paths().collect::<Vec<_>>(), vec!["x.class", "y.class"]);
        assert_eq!(cache.archives(), vec![jar]);
    }

    #[test]
    fn add_unreadable_archive_leaves_cache_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("bad.jar");
        std::fs::write(&jar, b"garbage").unwrap();

        let cache = ArchiveDirectoryCache::default();
        assert!(matches!(
            cache.add(&jar),
            Err(CacheError::ArchiveRead { .. })
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn add_replaces_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("a.jar");
        write_archive(&jar, &[("x.class", b"x")]);
        let cache = ArchiveDirectoryCache::default();
        let first = cache.add(&jar).unwrap();

        write_archive(&jar, &[("z.class", b"z")]);
        cache.add(&jar).unwrap();

        // The old Arc is still readable by whoever holds it.
        assert_eq!(first.entry_paths().collect::<Vec<_>>(), vec!["x.class"]);
        assert_eq!(
            cache.get(&jar).unwrap().entry_paths().collect::<Vec<_>>(),
            vec!["z.class"]
        );
    }

    #[test]
    fn remove_missing_is_noop() {
        let cache = ArchiveDirectoryCache::default();
        cache.remove(Path::new("/never/added.jar"));
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jar");
        let b = dir.path().join("b.jar");
        write_archive(&a, &[("a", b"a")]);
        write_archive(&b, &[("b", b"b")]);
        let cache = ArchiveDirectoryCache::default();
        cache.add(&a).unwrap();
        cache.add(&b).unwrap();
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn get_current_rejects_modified_archive() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("a.jar");
        write_archive(&jar, &[("x.class", b"x")]);
        let cache = ArchiveDirectoryCache::default();
        cache.add(&jar).unwrap();
        assert!(cache.get_current(&jar).is_some());

        write_archive(&jar, &[("x.class", b"x"), ("extra.class", b"extra")]);
        assert!(cache.get_current(&jar).is_none());
        assert!(cache.get(&jar).is_some());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("a.jar");
        write_archive(&jar, &[("x.class", b"x")]);
        let cache_dir = dir.path().join(".kiln-cache");

        let cache = ArchiveDirectoryCache::new(FingerprintMode::Checksum);
        cache.add(&jar).unwrap();
        cache.save(&cache_dir).unwrap();

        let loaded = ArchiveDirectoryCache::load(&cache_dir, FingerprintMode::Checksum).unwrap();
        assert_eq!(loaded.mode(), FingerprintMode::Checksum);
        assert_eq!(loaded.get(&jar), cache.get(&jar));
    }

    #[test]
    fn load_without_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ArchiveDirectoryCache::load(dir.path(), FingerprintMode::default()).is_none());
    }

    #[test]
    fn concurrent_readers_and_writers() {
        let dir = tempfile::tempdir().unwrap();
        let jars: Vec<_> = (0..4)
            .map(|i| {
                let jar = dir.path().join(format!("lib{i}.jar"));
                write_archive(&jar, &[("A.class", b"a")]);
                jar
            })
            .collect();
        let cache = Arc::new(ArchiveDirectoryCache::default());

        std::thread::scope(|scope| {
            for jar in &jars {
                let cache = Arc::clone(&cache);
                scope.spawn(move || {
                    for _ in 0..10 {
                        cache.add(jar).unwrap();
                        let _ = cache.get(jar);
                    }
                });
            }
        });

        assert_eq!(cache.len(), jars.len());
    }
}
