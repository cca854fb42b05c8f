//! Durable catalog image.
//!
//! The catalog is persisted as a single JSON document. Every mutation writes
//! a complete new image to a temporary file, syncs it, and renames it over
//! the previous one, so a crash leaves either the old or the new catalog.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use graft_common::constants::CATALOG_FORMAT_VERSION;
use graft_common::types::FileId;

use super::entry::{CatalogEntry, CreatedVia};
use crate::descriptor::FormatDescriptor;
use crate::error::{ImportError, ImportResult};

/// One table as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub uri: String,
    pub config: String,
    pub file_id: FileId,
    pub created_via: CreatedVia,
    pub checkpoint_generation: u64,
    pub file_name: String,
}

impl From<&CatalogEntry> for PersistedEntry {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            uri: entry.uri.clone(),
            config: entry.config_string(),
            file_id: entry.backing_file_id,
            created_via: entry.created_via,
            checkpoint_generation: entry.checkpoint_generation,
            file_name: entry.file_name.clone(),
        }
    }
}

impl TryFrom<PersistedEntry> for CatalogEntry {
    type Error = ImportError;

    fn try_from(p: PersistedEntry) -> ImportResult<Self> {
        Ok(Self {
            config: FormatDescriptor::parse(&p.config)?,
            uri: p.uri,
            backing_file_id: p.file_id,
            created_via: p.created_via,
            checkpoint_generation: p.checkpoint_generation,
            file_name: p.file_name,
        })
    }
}

/// The whole catalog as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogImage {
    pub format_version: u32,
    /// High-water mark of the id allocator.
    pub next_file_id: u64,
    pub entries: Vec<PersistedEntry>,
}

impl CatalogImage {
    /// Builds an image from live entries.
    pub fn new<'a>(next_file_id: u64, entries: impl IntoIterator<Item = &'a CatalogEntry>) -> Self {
        Self {
            format_version: CATALOG_FORMAT_VERSION,
            next_file_id,
            entries: entries.into_iter().map(PersistedEntry::from).collect(),
        }
    }

    /// Loads the image at `path`, or `None` if there is none yet.
    pub fn load(path: &Path) -> ImportResult<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ImportError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let image: Self = serde_json::from_str(&content)?;
        if image.format_version > CATALOG_FORMAT_VERSION {
            return Err(ImportError::invalid_config(
                "format_version",
                format!(
                    "catalog {} has version {}, newest supported is {}",
                    path.display(),
                    image.format_version,
                    CATALOG_FORMAT_VERSION
                ),
            ));
        }
        Ok(Some(image))
    }

    /// Writes the image atomically to `path`.
    pub fn save(&self, path: &Path) -> ImportResult<()> {
        let persist_err = |source: io::Error| ImportError::Persist {
            path: path.to_path_buf(),
            source,
        };
        let content = serde_json::to_vec_pretty(self)?;
        let tmp_path = tmp_path(path);

        let result = (|| -> io::Result<()> {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(&content)?;
            file.sync_all()?;
            std::fs::rename(&tmp_path, path)?;
            if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                File::open(dir)?.sync_all()?;
            }
            Ok(())
        })();

        if let Err(e) = result {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(persist_err(e));
        }
        debug!(path = %path.display(), entries = self.entries.len(), "catalog persisted");
        Ok(())
    }

    /// Decodes every entry.
    pub fn into_entries(self) -> ImportResult<Vec<CatalogEntry>> {
        self.entries.into_iter().map(CatalogEntry::try_from).collect()
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
