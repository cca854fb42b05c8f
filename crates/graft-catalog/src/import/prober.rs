//! File metadata probing.

use std::io;
use std::path::Path;

use tracing::debug;

use graft_storage::{DataFileReader, FileMetadata, StorageError};

use crate::catalog::Catalog;
use crate::error::{ImportError, ImportResult};

fn map_open_error(path: &Path, err: StorageError) -> ImportError {
    match err {
        StorageError::Io { source } if source.kind() == io::ErrorKind::NotFound => {
            ImportError::NotAValidDataFile {
                path: path.to_path_buf(),
                reason: "no such file".to_string(),
            }
        }
        StorageError::Io { source } if source.kind() == io::ErrorKind::UnexpectedEof => {
            ImportError::NotAValidDataFile {
                path: path.to_path_buf(),
                reason: "file too short".to_string(),
            }
        }
        StorageError::Io { source } => ImportError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => ImportError::NotAValidDataFile {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

/// Opens a data file read-only and returns its embedded metadata.
pub fn probe_metadata(path: &Path) -> ImportResult<FileMetadata> {
    let reader = DataFileReader::open(path).map_err(|e| map_open_error(path, e))?;
    Ok(reader.metadata().clone())
}

/// Opens an import candidate inside `data_dir`.
///
/// Fails with [`ImportError::FileInUse`] if the file already backs a table
/// in `catalog`, and with [`ImportError::NotAValidDataFile`] if it is
/// missing or its descriptor block does not decode.
pub fn probe(path: &Path, data_dir: &Path, catalog: &Catalog) -> ImportResult<DataFileReader> {
    if path.parent() == Some(data_dir) {
        if let Some(owner) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|name| catalog.entry_for_file(name))
        {
            return Err(ImportError::FileInUse {
                path: path.to_path_buf(),
                uri: owner.uri.clone(),
            });
        }
    }

    let reader = DataFileReader::open(path).map_err(|e| map_open_error(path, e))?;
    let meta = reader.metadata();
    debug!(
        path = %path.display(),
        file_id = %meta.file_id,
        allocation_size = meta.allocation_size,
        generation = meta.checkpoint.generation,
        entries = meta.checkpoint.entry_count,
        "probed data file"
    );
    Ok(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, CreatedVia};
    use crate::descriptor::FormatDescriptor;
    use graft_common::types::FileId;
    use graft_storage::DataFileWriter;
    use tempfile::TempDir;

    fn write_file(path: &Path, id: u64) {
        DataFileWriter::create(path, FileMetadata::new(FileId::new(id)), 1)
            .unwrap()
            .write_tree(Vec::new())
            .unwrap();
    }

    #[test]
    fn test_probe_metadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.gft");
        write_file(&path, 7);
        let meta = probe_metadata(&path).unwrap();
        assert_eq!(meta.file_id, FileId::new(7));
        assert_eq!(meta.checkpoint.generation, 1);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = probe(&dir.path().join("nope.gft"), dir.path(), &Catalog::in_memory()).unwrap_err();
        assert!(matches!(err, ImportError::NotAValidDataFile { ref reason, .. } if reason == "no such file"));
    }

    #[test]
    fn test_not_a_data_file() {
        let dir = TempDir::new().unwrap();
        let short = dir.path().join("short.gft");
        std::fs::write(&short, b"GRFT").unwrap();
        assert!(matches!(
            probe_metadata(&short),
            Err(ImportError::NotAValidDataFile { .. })
        ));

        let junk = dir.path().join("junk.gft");
        std::fs::write(&junk, vec![0xAB; 8192]).unwrap();
        assert!(matches!(
            probe_metadata(&junk),
            Err(ImportError::NotAValidDataFile { .. })
        ));
    }

    #[test]
    fn test_descriptor_checksum_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.gft");
        write_file(&path, 1);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[40] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();
        assert!(matches!(
            probe_metadata(&path),
            Err(ImportError::NotAValidDataFile { .. })
        ));
    }

    #[test]
    fn test_file_in_use() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.gft");
        write_file(&path, 1);
        let catalog = Catalog::in_memory();
        catalog
            .commit(CatalogEntry {
                uri: "table:t".into(),
                config: FormatDescriptor::new(),
                backing_file_id: FileId::new(1),
                created_via: CreatedVia::Native,
                checkpoint_generation: 1,
                file_name: "t.gft".into(),
            })
            .unwrap();
        let err = probe(&path, dir.path(), &catalog).unwrap_err();
        assert!(matches!(err, ImportError::FileInUse { ref uri, .. } if uri == "table:t"));
    }

    #[test]
    fn test_probe_never_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.gft");
        write_file(&path, 1);
        let before = std::fs::read(&path).unwrap();
        let reader = probe(&path, dir.path(), &Catalog::in_memory()).unwrap();
        drop(reader);
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }
}
