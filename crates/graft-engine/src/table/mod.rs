//! Live tables.
//!
//! A [`Table`] pairs a catalog entry with the table's rows, held in memory
//! as version chains, and the physical metadata of its data file.

pub(crate) mod cursor;
pub mod format;

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::RwLock;

use graft_catalog::{CatalogEntry, Schema, Validator, VerifyReport};
use graft_mvcc::VersionStore;
use graft_storage::{DataFileReader, FileMetadata, LeafEntry};

pub use cursor::Cursor;
pub use format::{pack, unpack, Datum};

use crate::error::{EngineError, EngineResult};

/// A registered table and its in-memory rows.
#[derive(Debug)]
pub struct Table {
    entry: RwLock<Arc<CatalogEntry>>,
    metadata: RwLock<FileMetadata>,
    store: VersionStore,
    path: PathBuf,
}

impl Table {
    /// Creates a table from already-loaded rows.
    pub fn new(
        entry: Arc<CatalogEntry>,
        metadata: FileMetadata,
        rows: Vec<LeafEntry>,
        path: PathBuf,
    ) -> Self {
        Self {
            entry: RwLock::new(entry),
            metadata: RwLock::new(metadata),
            store: VersionStore::from_entries(rows),
            path,
        }
    }

    /// Loads a committed table from its data file.
    pub fn load(data_dir: &Path, entry: Arc<CatalogEntry>) -> EngineResult<Self> {
        let path = data_dir.join(&entry.file_name);
        let reader = DataFileReader::open(&path)?;
        let rows = reader.scan()?;
        let metadata = reader.metadata().clone();
        Ok(Self::new(entry, metadata, rows, path))
    }

    /// Table URI.
    pub fn uri(&self) -> String {
        self.entry.read().uri.clone()
    }

    /// Current catalog entry.
    pub fn entry(&self) -> Arc<CatalogEntry> {
        self.entry.read().clone()
    }

    pub(crate) fn set_entry(&self, entry: Arc<CatalogEntry>) {
        *self.entry.write() = entry;
    }

    /// Physical metadata of the data file as last written or loaded.
    pub fn metadata(&self) -> FileMetadata {
        self.metadata.read().clone()
    }

    pub(crate) fn set_metadata(&self, metadata: FileMetadata) {
        *self.metadata.write() = metadata;
    }

    /// Key and value layout.
    pub fn schema(&self) -> EngineResult<Schema> {
        Ok(self.entry.read().schema()?)
    }

    /// Row versions.
    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    /// Path of the data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Walks the data file on disk and checks its structure.
    ///
    /// Rows written since the last checkpoint are not on disk and are not
    /// covered.
    pub fn verify(&self, interrupt: Option<&AtomicBool>) -> EngineResult<VerifyReport> {
        let reader = DataFileReader::open(&self.path)?;
        let mut validator = Validator::new(&reader);
        if let Some(flag) = interrupt {
            validator = validator.with_interrupt(flag);
        }
        validator.run().map_err(EngineError::from)
    }
}
