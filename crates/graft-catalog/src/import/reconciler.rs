//! Catalog reconciliation.
//!
//! Merges the destination configuration with the metadata exported from the
//! source instance and the metadata probed from the file itself. The file is
//! always the authority on physical layout; the other two inputs may only
//! restate it.

use tracing::{debug, warn};

use graft_storage::FileMetadata;

use super::physical::{check_physical, is_physical_key, physical_entries};
use super::request::ImportRequest;
use crate::catalog::{data_file_name, Catalog, CatalogEntry, CreatedVia};
use crate::descriptor::{ConfigValue, FormatDescriptor, ID_KEY};
use crate::error::{ImportError, ImportResult};
use crate::schema::Schema;

const FORMAT_KEYS: [&str; 2] = ["key_format", "value_format"];

fn file_format<'a>(key: &str, probed: &'a FileMetadata) -> &'a str {
    if key == "key_format" {
        &probed.key_format
    } else {
        &probed.value_format
    }
}

fn check_format(key: &str, declared: &ConfigValue, probed: &FileMetadata) -> ImportResult<()> {
    let actual = file_format(key, probed);
    if declared.as_str() == Some(actual) {
        Ok(())
    } else {
        Err(ImportError::schema_conflict(key, declared, actual))
    }
}

/// Checks the keys of the supplied metadata that the file can vouch for.
fn check_supplied(supplied: &FormatDescriptor, probed: &FileMetadata) -> ImportResult<()> {
    for (key, value) in supplied.iter() {
        if is_physical_key(key) {
            check_physical(key, value, probed)?;
        } else if FORMAT_KEYS.contains(&key) {
            check_format(key, value, probed)?;
        }
    }
    Ok(())
}

/// Produces the catalog entry for an import.
///
/// Nothing is registered here; the catalog is only consulted for a fresh
/// file id. The id is allocated once the metadata checks pass, so a
/// conflicting import never consumes one. An import that later fails
/// validation or commit leaves a gap in the id sequence.
pub fn reconcile(
    request: &ImportRequest,
    dest: &FormatDescriptor,
    probed: &FileMetadata,
    catalog: &Catalog,
) -> ImportResult<CatalogEntry> {
    let uri = request.destination_uri.as_str();
    let supplied = if request.repair {
        if request.source_file_metadata.is_some() {
            warn!(uri, "repair import ignores the supplied file_metadata");
        }
        None
    } else {
        let supplied = request
            .source_file_metadata
            .as_ref()
            .ok_or_else(|| ImportError::MissingMetadata { uri: uri.to_string() })?;
        check_supplied(supplied, probed)?;
        Some(supplied)
    };

    for (key, value) in dest.iter() {
        if is_physical_key(key) {
            check_physical(key, value, probed)?;
        }
    }

    let mut merged = dest.clone();
    if let Some(supplied) = supplied {
        for (key, value) in supplied.iter() {
            if key != ID_KEY {
                merged.set_default(key, value.clone());
            }
        }
    }
    for (key, value) in physical_entries(probed) {
        merged.set_default(key, value);
    }
    for key in FORMAT_KEYS {
        merged.set_default(key, file_format(key, probed));
        if let Some(declared) = merged.get(key) {
            check_format(key, declared, probed)?;
        }
    }
    Schema::from_config(&merged)?.check_columns()?;

    let file_id = catalog.allocate_file_id();
    let id = i64::try_from(file_id.as_u64())
        .map_err(|_| ImportError::invalid_config(ID_KEY, "file id space exhausted"))?;
    merged.set(ID_KEY, id);

    debug!(
        uri,
        file_id = %file_id,
        source_id = %probed.file_id,
        repair = request.repair,
        "reconciled import metadata"
    );
    Ok(CatalogEntry {
        uri: uri.to_string(),
        config: merged,
        backing_file_id: file_id,
        created_via: CreatedVia::Imported,
        checkpoint_generation: probed.checkpoint.generation,
        file_name: data_file_name(uri)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_common::types::FileId;
    use graft_storage::{ChecksumMode, Compressor};

    fn probed() -> FileMetadata {
        let mut meta = FileMetadata::new(FileId::new(11))
            .with_checksum_mode(ChecksumMode::Full)
            .with_compressor(Some(Compressor::Snappy))
            .with_formats("S", "S");
        meta.checkpoint.generation = 4;
        meta
    }

    fn exported() -> FormatDescriptor {
        FormatDescriptor::parse(
            "app_metadata=tag,allocation_size=4096,block_compressor=snappy,checksum=full,\
             columns=(k,v),format_version=1,id=11,internal_page_max=4096,key_format=S,\
             leaf_key_max=0,leaf_page_max=32768,leaf_value_max=0,log=(enabled=false),value_format=S",
        )
        .unwrap()
    }

    fn dest() -> FormatDescriptor {
        FormatDescriptor::parse("key_format=S,value_format=S").unwrap()
    }

    #[test]
    fn test_reconcile_with_metadata() {
        let catalog = Catalog::in_memory();
        let _ = catalog.allocate_file_id();
        let request = ImportRequest::new("table:t").with_file_metadata(exported());
        let entry = reconcile(&request, &dest(), &probed(), &catalog).unwrap();

        assert_eq!(entry.backing_file_id, FileId::new(2));
        assert_eq!(entry.config.get_int("id"), Some(2));
        assert_eq!(entry.checkpoint_generation, 4);
        assert_eq!(entry.created_via, CreatedVia::Imported);
        assert_eq!(entry.file_name, "t.gft");
        assert!(entry.config.equivalent(&exported()));
        // Destination keys keep their place at the front.
        assert_eq!(entry.config.keys().take(2).collect::<Vec<_>>(), vec!["key_format", "value_format"]);
    }

    #[test]
    fn test_missing_metadata() {
        let request = ImportRequest::new("table:t");
        let err = reconcile(&request, &dest(), &probed(), &Catalog::in_memory()).unwrap_err();
        assert!(matches!(err, ImportError::MissingMetadata { .. }));
    }

    #[test]
    fn test_supplied_physical_conflict() {
        let mut meta = exported();
        meta.set("allocation_size", 8192i64);
        let request = ImportRequest::new("table:t").with_file_metadata(meta);
        let err = reconcile(&request, &dest(), &probed(), &Catalog::in_memory()).unwrap_err();
        assert!(matches!(err, ImportError::SchemaConflict { ref key, .. } if key == "allocation_size"));
    }

    #[test]
    fn test_dest_physical_conflict() {
        let mut d = dest();
        d.set("checksum", "none");
        let request = ImportRequest::new("table:t").with_repair(true);
        let err = reconcile(&request, &d, &probed(), &Catalog::in_memory()).unwrap_err();
        assert!(matches!(err, ImportError::SchemaConflict { ref key, .. } if key == "checksum"));
    }

    #[test]
    fn test_format_conflict() {
        let d = FormatDescriptor::parse("key_format=i,value_format=S").unwrap();
        let request = ImportRequest::new("table:t").with_repair(true);
        let err = reconcile(&request, &d, &probed(), &Catalog::in_memory()).unwrap_err();
        assert!(matches!(err, ImportError::SchemaConflict { ref key, .. } if key == "key_format"));
    }

    #[test]
    fn test_column_arity_conflict() {
        let d = FormatDescriptor::parse("key_format=S,value_format=S,columns=(a,b,c)").unwrap();
        let request = ImportRequest::new("table:t").with_repair(true);
        let err = reconcile(&request, &d, &probed(), &Catalog::in_memory()).unwrap_err();
        assert!(matches!(err, ImportError::SchemaConflict { ref key, .. } if key == "columns"));
    }

    #[test]
    fn test_repair_takes_physical_keys_from_file() {
        let mut wrong = exported();
        wrong.set("allocation_size", 65536i64);
        let request = ImportRequest::new("table:t")
            .with_repair(true)
            .with_file_metadata(wrong);
        let entry = reconcile(&request, &FormatDescriptor::new(), &probed(), &Catalog::in_memory()).unwrap();
        for (key, value) in physical_entries(&probed()) {
            assert_eq!(entry.config.get(key), Some(&value), "{key}");
        }
        assert_eq!(entry.config.get_str("key_format"), Some("S"));
        assert!(!entry.config.contains("app_metadata"));
    }

    #[test]
    fn test_failed_reconcile_does_not_consume_id() {
        let catalog = Catalog::in_memory();
        let request = ImportRequest::new("table:t");
        assert!(reconcile(&request, &dest(), &probed(), &catalog).is_err());
        assert_eq!(catalog.allocate_file_id(), FileId::FIRST);
    }
}
