//! Catalog store
//!
//! Holds the current [`CatalogSnapshot`] behind an `Arc` that is swapped
//! wholesale on refresh, so readers always see either the old or the new
//! complete listing.

use log::{debug, info, warn};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::UNIX_EPOCH;
use tokio::fs;
use tokio::sync::RwLock;

use crate::catalog::FileEntry;
use crate::error::CatalogError;

/// In-flight transfers are written under this prefix and never catalogued.
pub const PARTIAL_PREFIX: &str = ".lanshare-partial-";

/// One immutable listing. Indices are only meaningful against the snapshot
/// that issued them.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    generation: u64,
    entries: Vec<FileEntry>,
}

impl CatalogSnapshot {
    pub fn new(generation: u64, entries: Vec<FileEntry>) -> Self {
        Self {
            generation,
            entries,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`, or `IndexOutOfRange` for negative or too-large indices.
    pub fn get(&self, index: i64) -> Result<&FileEntry, CatalogError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.entries.get(i))
            .ok_or(CatalogError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            })
    }
}

/// Shared catalog of one flat directory.
pub struct FileCatalog {
    root: PathBuf,
    current: RwLock<Arc<CatalogSnapshot>>,
    generation: AtomicU64,
}

impl FileCatalog {
    /// Create an empty catalog; call [`refresh`](Self::refresh) to populate it.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            current: RwLock::new(Arc::new(CatalogSnapshot::default())),
            generation: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The current snapshot.
    pub async fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&*self.current.read().await)
    }

    /// Re-scan the directory and swap in the new snapshot.
    ///
    /// An unreadable or missing directory produces an empty snapshot.
    pub async fn refresh(&self) -> Arc<CatalogSnapshot> {
        let entries = match scan_directory(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("{}", e);
                Vec::new()
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(CatalogSnapshot::new(generation, entries));

        let mut current = self.current.write().await;
        // Two racing refreshes must not let the older scan win.
        if current.generation() < generation {
            *current = Arc::clone(&snapshot);
        }
        drop(current);

        info!(
            "Catalog refreshed: {} files in {} (generation {})",
            snapshot.len(),
            self.root.display(),
            generation
        );
        snapshot
    }

    /// Joins the shared directory with the entry name.
    pub fn resolve_path(&self, entry: &FileEntry) -> PathBuf {
        self.root.join(entry.name())
    }

    /// Re-checks an entry on disk, returning its path and fresh metadata.
    pub async fn verify(&self, entry: &FileEntry) -> Result<(PathBuf, Metadata), CatalogError> {
        let path = self.resolve_path(entry);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok((path, meta)),
            _ => Err(CatalogError::NotFound(entry.name().to_string())),
        }
    }
}

/// Lists regular files (symlinks followed) one level deep, sorted by name.
async fn scan_directory(root: &Path) -> Result<Vec<FileEntry>, CatalogError> {
    let unavailable = |e: std::io::Error| CatalogError::Unavailable(root.to_path_buf(), e);
    let mut dir = fs::read_dir(root).await.map_err(unavailable)?;
    let mut entries = Vec::new();

    while let Some(entry) = dir.next_entry().await.map_err(unavailable)? {
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                debug!("Skipping non UTF-8 file name {:?}", raw);
                continue;
            }
        };

        if name.starts_with(PARTIAL_PREFIX) {
            continue;
        }

        let meta = match fs::metadata(entry.path()).await {
            Ok(meta) => meta,
            Err(e) => {
                debug!("Skipping {}: {}", name, e);
                continue;
            }
        };

        if !meta.is_file() {
            continue;
        }

        let modified = meta.modified().unwrap_or(UNIX_EPOCH);
        entries.push(FileEntry::new(name, meta.len(), modified));
    }

    entries.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.bin"), vec![7u8; 32]).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"0123456789").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/inner.txt"), b"x").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_refresh_lists_files_only_sorted() {
        let dir = populated_dir();
        let catalog = FileCatalog::new(dir.path());
        let snapshot = catalog.refresh().await;

        let names: Vec<_> = snapshot.entries().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["a.txt", "b.bin"]);
        assert_eq!(snapshot.get(0).unwrap().size(), 10);
        assert_eq!(snapshot.get(1).unwrap().size(), 32);
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let dir = populated_dir();
        let catalog = FileCatalog::new(dir.path());
        let first = catalog.refresh().await;
        let second = catalog.refresh().await;

        assert_eq!(first.entries(), second.entries());
        assert!(second.generation() > first.generation());
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::new(dir.path().join("does-not-exist"));
        let snapshot = catalog.refresh().await;
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_get_rejects_out_of_range() {
        let dir = populated_dir();
        let catalog = FileCatalog::new(dir.path());
        let snapshot = catalog.refresh().await;

        assert!(matches!(
            snapshot.get(-1),
            Err(CatalogError::IndexOutOfRange { index: -1, len: 2 })
        ));
        assert!(matches!(
            snapshot.get(2),
            Err(CatalogError::IndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[tokio::test]
    async fn test_old_snapshot_survives_refresh() {
        let dir = populated_dir();
        let catalog = FileCatalog::new(dir.path());
        let old = catalog.refresh().await;

        std::fs::write(dir.path().join("0-first.txt"), b"new").unwrap();
        let new = catalog.refresh().await;

        assert_eq!(old.len(), 2);
        assert_eq!(old.get(0).unwrap().name(), "a.txt");
        assert_eq!(new.len(), 3);
        assert_eq!(new.get(0).unwrap().name(), "0-first.txt");
        assert_eq!(catalog.snapshot().await.generation(), new.generation());
    }

    #[tokio::test]
    async fn test_upload_temp_files_are_hidden() {
        let dir = populated_dir();
        let temp_name = format!("{}c.txt", PARTIAL_PREFIX);
        std::fs::write(dir.path().join(temp_name), b"partial").unwrap();

        let catalog = FileCatalog::new(dir.path());
        let snapshot = catalog.refresh().await;
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test]
    async fn test_verify_detects_vanished_file() {
        let dir = populated_dir();
        let catalog = FileCatalog::new(dir.path());
        let snapshot = catalog.refresh().await;
        let entry = snapshot.get(0).unwrap().clone();

        let (path, meta) = catalog.verify(&entry).await.unwrap();
        assert_eq!(path, dir.path().join("a.txt"));
        assert_eq!(meta.len(), 10);

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(
            catalog.verify(&entry).await,
            Err(CatalogError::NotFound(_))
        ));
    }
}
