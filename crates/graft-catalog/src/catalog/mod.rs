//! The table catalog.
//!
//! The catalog maps table URIs to [`CatalogEntry`] values. It is the single
//! owner of the namespace: [`Catalog::commit`] is the only way to add a
//! table and [`Catalog::record_checkpoint`] the only way to change one.
//! Both run under one write lock and persist a full catalog image before
//! touching the in-memory map, so a failed write leaves the namespace as it
//! was and readers only ever see whole entries.

mod entry;
mod persist;
mod reservation;
mod uri;

pub use entry::{CatalogEntry, CreatedVia};
pub use persist::{CatalogImage, PersistedEntry};
pub use reservation::{FileReservation, FileReservations};
pub use uri::{data_file_name, Uri};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use graft_common::constants::CATALOG_FILE_NAME;
use graft_common::types::FileId;

use crate::error::{ImportError, ImportResult};

/// Registered tables, keyed by URI.
pub struct Catalog {
    path: Option<PathBuf>,
    entries: RwLock<BTreeMap<String, Arc<CatalogEntry>>>,
    next_file_id: AtomicU64,
    reservations: FileReservations,
}

impl Catalog {
    /// Opens the catalog persisted in `dir`, or an empty one if none exists.
    pub fn open(dir: &Path) -> ImportResult<Self> {
        let path = dir.join(CATALOG_FILE_NAME);
        let (entries, persisted_next) = match CatalogImage::load(&path)? {
            Some(image) => {
                let next = image.next_file_id;
                (image.into_entries()?, next)
            }
            None => (Vec::new(), FileId::FIRST.as_u64()),
        };

        let mut map = BTreeMap::new();
        let mut next = persisted_next.max(FileId::FIRST.as_u64());
        for entry in entries {
            next = next.max(entry.backing_file_id.as_u64() + 1);
            map.insert(entry.uri.clone(), Arc::new(entry));
        }
        info!(path = %path.display(), tables = map.len(), next_file_id = next, "catalog opened");

        Ok(Self {
            path: Some(path),
            entries: RwLock::new(map),
            next_file_id: AtomicU64::new(next),
            reservations: FileReservations::new(),
        })
    }

    /// Creates a catalog that is never persisted.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(BTreeMap::new()),
            next_file_id: AtomicU64::new(FileId::FIRST.as_u64()),
            reservations: FileReservations::new(),
        }
    }

    /// Path of the persisted image, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Looks up a table.
    pub fn get(&self, uri: &str) -> Option<Arc<CatalogEntry>> {
        self.entries.read().get(uri).cloned()
    }

    /// Returns true if `uri` is registered.
    pub fn contains(&self, uri: &str) -> bool {
        self.entries.read().contains_key(uri)
    }

    /// Returns every entry in URI order.
    pub fn entries(&self) -> Vec<Arc<CatalogEntry>> {
        self.entries.read().values().cloned().collect()
    }

    /// Number of registered tables.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no table is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns the entry backed by the data file `file_name`.
    pub fn entry_for_file(&self, file_name: &str) -> Option<Arc<CatalogEntry>> {
        self.entries
            .read()
            .values()
            .find(|e| e.file_name == file_name)
            .cloned()
    }

    /// Allocates a file id. Ids are never reused.
    pub fn allocate_file_id(&self) -> FileId {
        FileId::new(self.next_file_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Reserves a source file for the duration of an import.
    pub fn reserve_file(&self, path: &Path) -> FileReservation {
        self.reservations.reserve(path)
    }

    /// Returns the image that would be persisted right now.
    pub fn to_image(&self) -> CatalogImage {
        let entries = self.entries.read();
        CatalogImage::new(
            self.next_file_id.load(Ordering::SeqCst),
            entries.values().map(|e| e.as_ref()),
        )
    }

    /// Registers a new table.
    pub fn commit(&self, entry: CatalogEntry) -> ImportResult<Arc<CatalogEntry>> {
        self.commit_with(entry, |_| {})
    }

    /// Registers a new table and runs `on_commit` before the write lock is
    /// released.
    ///
    /// `on_commit` runs only after the entry is durable and visible; it lets
    /// the caller attach in-memory state that must not be observable without
    /// the entry, or the other way around.
    pub fn commit_with<F>(&self, entry: CatalogEntry, on_commit: F) -> ImportResult<Arc<CatalogEntry>>
    where
        F: FnOnce(&Arc<CatalogEntry>),
    {
        let mut entries = self.entries.write();
        if entries.contains_key(&entry.uri) {
            return Err(ImportError::NameConflict { uri: entry.uri });
        }
        if let Some(other) = entries.values().find(|e| e.file_name == entry.file_name) {
            return Err(ImportError::FileInUse {
                path: PathBuf::from(&entry.file_name),
                uri: other.uri.clone(),
            });
        }
        if let Some(other) = entries
            .values()
            .find(|e| e.backing_file_id == entry.backing_file_id)
        {
            return Err(ImportError::invalid_config(
                "id",
                format!("file id {} already used by {}", entry.backing_file_id, other.uri),
            ));
        }

        let entry = Arc::new(entry);
        if let Some(path) = &self.path {
            let image = CatalogImage::new(
                self.next_file_id.load(Ordering::SeqCst),
                entries.values().map(|e| e.as_ref()).chain(std::iter::once(entry.as_ref())),
            );
            image.save(path)?;
        }
        entries.insert(entry.uri.clone(), Arc::clone(&entry));
        on_commit(&entry);

        info!(
            uri = %entry.uri,
            file = %entry.file_name,
            id = %entry.backing_file_id,
            via = ?entry.created_via,
            "table committed"
        );
        Ok(entry)
    }

    /// Records completed checkpoints for the given tables.
    ///
    /// This is the only mutation of an existing entry. Unknown URIs are an
    /// error and leave every entry unchanged.
    pub fn record_checkpoint(&self, generations: &[(String, u64)]) -> ImportResult<()> {
        let mut entries = self.entries.write();
        let mut updated = entries.clone();
        for (uri, generation) in generations {
            let current = updated.get(uri).ok_or_else(|| {
                ImportError::invalid_uri(uri.clone(), "no such table in the catalog")
            })?;
            let next = Arc::new(current.with_checkpoint_generation(*generation));
            updated.insert(uri.clone(), next);
        }
        if let Some(path) = &self.path {
            CatalogImage::new(
                self.next_file_id.load(Ordering::SeqCst),
                updated.values().map(|e| e.as_ref()),
            )
            .save(path)?;
        }
        *entries = updated;
        debug!(tables = generations.len(), "checkpoint generations recorded");
        Ok(())
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("path", &self.path)
            .field("tables", &self.len())
            .field("next_file_id", &self.next_file_id.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FormatDescriptor;
    use std::thread;
    use tempfile::TempDir;

    fn entry(catalog: &Catalog, uri: &str) -> CatalogEntry {
        let id = catalog.allocate_file_id();
        CatalogEntry {
            uri: uri.to_string(),
            config: FormatDescriptor::parse(&format!("key_format=S,value_format=S,id={}", id.as_u64()))
                .unwrap(),
            backing_file_id: id,
            created_via: CreatedVia::Native,
            checkpoint_generation: 0,
            file_name: data_file_name(uri).unwrap(),
        }
    }

    #[test]
    fn test_commit_and_get() {
        let catalog = Catalog::in_memory();
        let e = entry(&catalog, "table:a");
        catalog.commit(e.clone()).unwrap();
        assert_eq!(catalog.get("table:a").unwrap().as_ref(), &e);
        assert!(catalog.contains("table:a"));
        assert_eq!(catalog.entry_for_file("a.gft").unwrap().uri, "table:a");
    }

    #[test]
    fn test_commit_name_conflict() {
        let catalog = Catalog::in_memory();
        catalog.commit(entry(&catalog, "table:a")).unwrap();
        let err = catalog.commit(entry(&catalog, "table:a")).unwrap_err();
        assert!(matches!(err, ImportError::NameConflict { ref uri } if uri == "table:a"));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_commit_file_in_use() {
        let catalog = Catalog::in_memory();
        catalog.commit(entry(&catalog, "table:a")).unwrap();
        let mut other = entry(&catalog, "table:b");
        other.file_name = "a.gft".into();
        assert!(matches!(
            catalog.commit(other),
            Err(ImportError::FileInUse { .. })
        ));
    }

    #[test]
    fn test_commit_duplicate_id() {
        let catalog = Catalog::in_memory();
        let a = entry(&catalog, "table:a");
        let mut b = entry(&catalog, "table:b");
        b.backing_file_id = a.backing_file_id;
        catalog.commit(a).unwrap();
        assert!(catalog.commit(b).is_err());
        assert!(!catalog.contains("table:b"));
    }

    #[test]
    fn test_persist_and_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let catalog = Catalog::open(dir.path()).unwrap();
            catalog.commit(entry(&catalog, "table:a")).unwrap();
            catalog.commit(entry(&catalog, "table:b")).unwrap();
            catalog
                .record_checkpoint(&[("table:a".to_string(), 5)])
                .unwrap();
        }
        let catalog = Catalog::open(dir.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("table:a").unwrap().checkpoint_generation, 5);
        // Ids allocated before the restart are never handed out again.
        assert_eq!(catalog.allocate_file_id(), FileId::new(3));
    }

    #[test]
    fn test_unused_ids_not_reused_after_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let catalog = Catalog::open(dir.path()).unwrap();
            let _burned = catalog.allocate_file_id();
            catalog.commit(entry(&catalog, "table:a")).unwrap();
        }
        let catalog = Catalog::open(dir.path()).unwrap();
        assert_eq!(catalog.allocate_file_id(), FileId::new(3));
    }

    #[test]
    fn test_failed_persist_leaves_namespace_unchanged() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::open(dir.path()).unwrap();
        catalog.commit(entry(&catalog, "table:a")).unwrap();
        let before = catalog.to_image();

        // A directory in place of the image makes the rename fail.
        let path = dir.path().join(CATALOG_FILE_NAME);
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        let err = catalog.commit(entry(&catalog, "table:b")).unwrap_err();
        assert!(matches!(err, ImportError::Persist { .. }));
        assert!(!catalog.contains("table:b"));
        assert_eq!(catalog.to_image().entries, before.entries);
    }

    #[test]
    fn test_record_checkpoint_unknown_uri() {
        let catalog = Catalog::in_memory();
        catalog.commit(entry(&catalog, "table:a")).unwrap();
        assert!(catalog
            .record_checkpoint(&[("table:a".into(), 2), ("table:zz".into(), 2)])
            .is_err());
        assert_eq!(catalog.get("table:a").unwrap().checkpoint_generation, 0);
    }

    #[test]
    fn test_commit_with_runs_hook_once() {
        let catalog = Catalog::in_memory();
        let mut seen = Vec::new();
        catalog
            .commit_with(entry(&catalog, "table:a"), |e| seen.push(e.uri.clone()))
            .unwrap();
        assert_eq!(seen, vec!["table:a".to_string()]);
    }

    #[test]
    fn test_concurrent_commits_same_uri() {
        let catalog = Arc::new(Catalog::in_memory());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let catalog = Arc::clone(&catalog);
                thread::spawn(move || {
                    let e = entry(&catalog, "table:same");
                    catalog.commit(e).is_ok()
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(catalog.len(), 1);
    }
}
