//! Command implementations.
//!
//! Each command returns its rendered output so `main` alone decides where
//! it goes.

use std::path::Path;

use anyhow::{bail, Context, Result};

use graft_catalog::import::{physical_entries, probe_metadata};
use graft_catalog::{FormatDescriptor, Validator};
use graft_common::config::EngineConfig;
use graft_common::types::Timestamp;
use graft_engine::Database;
use graft_storage::DataFileReader;

use crate::formatter::{format_properties, OutputFormat, Property};

/// Arguments of `graft import`.
#[derive(Debug)]
pub struct ImportArgs<'a> {
    pub uri: &'a str,
    pub table_config: Option<&'a str>,
    pub repair: bool,
    pub stable_timestamp: Option<u64>,
}

/// Prints the metadata embedded in a data file.
pub fn inspect(path: &Path, format: OutputFormat) -> Result<String> {
    let meta = probe_metadata(path)?;
    let physical: FormatDescriptor = physical_entries(&meta).into_iter().collect();
    let checkpoint = meta.checkpoint;

    let properties = vec![
        Property::new("path", path.display().to_string()),
        Property::new("file_id", meta.file_id.as_u64()),
        Property::new("key_format", meta.key_format.clone()),
        Property::new("value_format", meta.value_format.clone()),
        Property::new("physical", physical.render()),
        Property::new("generation", checkpoint.generation),
        Property::new("entries", checkpoint.entry_count),
        Property::new("newest_timestamp", checkpoint.newest_timestamp.to_string()),
        Property::new("root", checkpoint.root.to_string()),
        Property::new("file_size", checkpoint.file_size),
    ];
    Ok(format_properties(&properties, format))
}

/// Walks a data file and reports what it holds.
pub fn verify(path: &Path, format: OutputFormat) -> Result<String> {
    let reader = DataFileReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let report = Validator::new(&reader).run()?;

    let properties = vec![
        Property::new("path", path.display().to_string()),
        Property::new("pages", report.pages),
        Property::new("leaf_pages", report.leaf_pages),
        Property::new("internal_pages", report.internal_pages),
        Property::new("entries", report.entries),
        Property::new("newest_timestamp", report.newest_timestamp.to_string()),
        Property::new("depth", report.max_depth),
    ];
    Ok(format_properties(&properties, format))
}

/// Prints a table's configuration string.
///
/// Table output is the bare string so it can be passed straight to
/// `graft import`.
pub fn export(config: EngineConfig, uri: &str, format: OutputFormat) -> Result<String> {
    let db = open_existing(config.with_checkpoint_on_close(false))?;
    let metadata = db.session().metadata(uri)?;
    db.close()?;

    Ok(match format {
        OutputFormat::Table => metadata,
        OutputFormat::Json => format_properties(
            &[Property::new("uri", uri), Property::new("config", metadata)],
            format,
        ),
    })
}

/// Creates or attaches a table.
pub fn import(config: EngineConfig, args: &ImportArgs<'_>, format: OutputFormat) -> Result<String> {
    let db = Database::open(config)?;
    if let Some(ts) = args.stable_timestamp {
        db.set_stable_timestamp(Timestamp::new(ts));
    }
    let session = db.session();

    let mut properties = vec![Property::new("uri", args.uri)];
    match (args.table_config, args.repair) {
        (Some(table_config), _) => session.create(args.uri, table_config)?,
        (None, true) => {
            let outcome = session.live_import(args.uri, None)?;
            properties.push(Property::new("entries", outcome.report.entries));
            properties.push(Property::new("pages", outcome.report.pages));
        }
        (None, false) => bail!("give an exported configuration or --repair"),
    }
    properties.push(Property::new("config", session.metadata(args.uri)?));
    db.close()?;
    Ok(format_properties(&properties, format))
}

fn open_existing(config: EngineConfig) -> Result<Database> {
    let dir = config.data_dir.clone();
    Database::open(config.with_create_if_missing(false))
        .with_context(|| format!("opening data directory {}", dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_export_then_import_elsewhere() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        {
            let db = Database::open(EngineConfig::with_data_dir(src.path())).unwrap();
            let session = db.session();
            session.create("table:t", "key_format=S,value_format=S").unwrap();
            session
                .open_cursor("table:t")
                .unwrap()
                .insert_row(&["1".into()], &["A".into()], Timestamp::new(10))
                .unwrap();
            db.close().unwrap();
        }

        let exported = export(EngineConfig::with_data_dir(src.path()), "table:t", OutputFormat::Table).unwrap();
        std::fs::copy(src.path().join("t.gft"), dst.path().join("t.gft")).unwrap();

        let inspected = inspect(&dst.path().join("t.gft"), OutputFormat::Json).unwrap();
        assert!(inspected.contains("\"entries\": 1"));

        let table_config = format!("{},import=(enabled=true,file_metadata=({}))", exported, exported);
        let args = ImportArgs {
            uri: "table:t",
            table_config: Some(&table_config),
            repair: false,
            stable_timestamp: None,
        };
        let out = import(EngineConfig::with_data_dir(dst.path()), &args, OutputFormat::Json).unwrap();
        assert!(out.contains("key_format=S"));

        let verified = verify(&dst.path().join("t.gft"), OutputFormat::Json).unwrap();
        assert!(verified.contains("\"entries\": 1"));
    }

    #[test]
    fn test_import_needs_config_or_repair() {
        let dir = TempDir::new().unwrap();
        let args = ImportArgs {
            uri: "table:t",
            table_config: None,
            repair: false,
            stable_timestamp: None,
        };
        assert!(import(EngineConfig::with_data_dir(dir.path()), &args, OutputFormat::Table).is_err());
    }

    #[test]
    fn test_export_missing_directory() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::with_data_dir(dir.path().join("absent"));
        assert!(export(config, "table:t", OutputFormat::Table).is_err());
    }
}
