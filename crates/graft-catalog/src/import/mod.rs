//! Live table import.
//!
//! An import attaches a data file written by another instance to this one.
//! It runs in stages, each of which may fail without side effects:
//!
//! 1. **Request**: the `import=(…)` group is split from the table config.
//! 2. **Probe**: the file is opened read-only and its descriptor decoded.
//! 3. **Reconcile**: destination config, exported metadata and the probed
//!    file are merged into a catalog entry with a fresh file id.
//! 4. **Validate**: the whole page tree is walked and checked.
//! 5. **Commit**: the entry is registered under the catalog write lock.
//!
//! The source file is reserved from the probe until the commit finishes, so
//! concurrent imports of the same file serialize and the loser observes the
//! winner's entry.

pub mod physical;
pub mod prober;
pub mod reconciler;
pub mod request;
pub mod state;
pub mod validator;

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::info;

use graft_common::types::Timestamp;
use graft_storage::{FileMetadata, LeafEntry};

pub use physical::{check_physical, file_metadata_from_config, physical_entries, PHYSICAL_KEYS};
pub use prober::{probe, probe_metadata};
pub use reconciler::reconcile;
pub use request::{ImportRequest, IMPORT_KEY};
pub use state::{ImportOperation, ImportState};
pub use validator::{Validator, VerifyReport};

use crate::catalog::{data_file_name, Catalog, CatalogEntry};
use crate::descriptor::FormatDescriptor;
use crate::error::{ImportError, ImportResult};

/// Environment an import runs in.
#[derive(Debug, Clone, Copy)]
pub struct ImportContext<'a> {
    /// Destination catalog.
    pub catalog: &'a Catalog,
    /// Directory holding the destination's data files.
    pub data_dir: &'a Path,
    /// Newest timestamp the destination considers stable, if it has one.
    pub stable_timestamp: Option<Timestamp>,
    /// Set to abandon validation.
    pub interrupt: Option<&'a AtomicBool>,
}

impl<'a> ImportContext<'a> {
    /// Creates a context with no stable timestamp and no interrupt flag.
    pub fn new(catalog: &'a Catalog, data_dir: &'a Path) -> Self {
        Self {
            catalog,
            data_dir,
            stable_timestamp: None,
            interrupt: None,
        }
    }

    /// Sets the stable timestamp.
    #[must_use]
    pub fn with_stable_timestamp(mut self, ts: Timestamp) -> Self {
        self.stable_timestamp = Some(ts);
        self
    }

    /// Sets the interrupt flag.
    #[must_use]
    pub fn with_interrupt(mut self, flag: &'a AtomicBool) -> Self {
        self.interrupt = Some(flag);
        self
    }
}

/// Result of a committed import.
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    /// The registered entry.
    pub entry: Arc<CatalogEntry>,
    /// Metadata probed from the file.
    pub metadata: FileMetadata,
    /// What validation saw.
    pub report: VerifyReport,
    /// Stages visited.
    pub states: Vec<ImportState>,
}

/// Imports the table described by a create configuration.
///
/// `config` must carry an enabled `import` group. `install` runs under the
/// catalog write lock right after the entry becomes visible and receives
/// every validated row, so callers can publish the table's in-memory state
/// atomically with the entry.
pub fn import_table<F>(
    ctx: &ImportContext<'_>,
    uri: &str,
    config: &FormatDescriptor,
    install: F,
) -> ImportResult<ImportOutcome>
where
    F: FnOnce(&Arc<CatalogEntry>, &FileMetadata, Vec<LeafEntry>),
{
    let Some((request, dest)) = ImportRequest::from_config(uri, config)? else {
        return Err(ImportError::invalid_config(IMPORT_KEY, "missing import group"));
    };
    if !request.enabled {
        return Err(ImportError::invalid_config("import.enabled", "import is not enabled"));
    }
    run_import(ctx, &request, &dest, install)
}

/// Runs an import request against a destination configuration.
pub fn run_import<F>(
    ctx: &ImportContext<'_>,
    request: &ImportRequest,
    dest: &FormatDescriptor,
    install: F,
) -> ImportResult<ImportOutcome>
where
    F: FnOnce(&Arc<CatalogEntry>, &FileMetadata, Vec<LeafEntry>),
{
    let mut op = ImportOperation::new(&request.destination_uri);
    match stages(ctx, request, dest, install, &mut op) {
        Ok((entry, metadata, report)) => {
            info!(
                uri = %entry.uri,
                file_id = %entry.backing_file_id,
                entries = report.entries,
                pages = report.pages,
                elapsed_ms = op.elapsed().as_millis() as u64,
                "table imported"
            );
            Ok(ImportOutcome {
                entry,
                metadata,
                report,
                states: op.into_history(),
            })
        }
        Err(err) => {
            op.fail(&err);
            Err(err)
        }
    }
}

fn stages<F>(
    ctx: &ImportContext<'_>,
    request: &ImportRequest,
    dest: &FormatDescriptor,
    install: F,
    op: &mut ImportOperation,
) -> ImportResult<(Arc<CatalogEntry>, FileMetadata, VerifyReport)>
where
    F: FnOnce(&Arc<CatalogEntry>, &FileMetadata, Vec<LeafEntry>),
{
    let uri = request.destination_uri.as_str();
    let path = ctx.data_dir.join(data_file_name(uri)?);

    let _reservation = ctx.catalog.reserve_file(&path);
    if ctx.catalog.contains(uri) {
        return Err(ImportError::NameConflict { uri: uri.to_string() });
    }
    if !request.repair && request.source_file_metadata.is_none() {
        return Err(ImportError::MissingMetadata { uri: uri.to_string() });
    }

    let reader = probe(&path, ctx.data_dir, ctx.catalog)?;
    op.advance(ImportState::Probed)?;

    let entry = reconcile(request, dest, reader.metadata(), ctx.catalog)?;
    op.advance(ImportState::Reconciled)?;

    let mut validator = Validator::new(&reader);
    if let Some(flag) = ctx.interrupt {
        validator = validator.with_interrupt(flag);
    }
    let (report, rows) = validator.run_and_collect()?;
    if let Some(stable) = ctx.stable_timestamp {
        if report.newest_timestamp > stable {
            return Err(ImportError::TimestampsPastStable {
                path: path.clone(),
                newest: report.newest_timestamp,
                stable,
            });
        }
    }
    op.advance(ImportState::Validated)?;

    let metadata = reader.metadata().clone();
    drop(reader);
    let committed = ctx
        .catalog
        .commit_with(entry, |entry| install(entry, &metadata, rows))?;
    op.advance(ImportState::Committed)?;
    Ok((committed, metadata, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_common::types::FileId;
    use graft_storage::{DataFileWriter, VersionRecord};
    use tempfile::TempDir;

    fn write_table(dir: &Path, name: &str) -> FileMetadata {
        let rows: Vec<LeafEntry> = (1..=3u64)
            .map(|i| {
                LeafEntry::new(
                    format!("{i}").into_bytes(),
                    vec![VersionRecord::value(
                        Timestamp::new(i * 10),
                        Timestamp::MAX,
                        format!("v{i}").into_bytes(),
                    )],
                )
            })
            .collect();
        let meta = FileMetadata::new(FileId::new(42)).with_formats("S", "S");
        DataFileWriter::create(dir.join(name), meta, 2)
            .unwrap()
            .write_tree(rows)
            .unwrap()
            .metadata
    }

    fn export(meta: &FileMetadata) -> String {
        let mut d: FormatDescriptor = physical_entries(meta).into_iter().collect();
        d.set("key_format", meta.key_format.as_str());
        d.set("value_format", meta.value_format.as_str());
        d.set("id", 42i64);
        d.render()
    }

    #[test]
    fn test_import_table() {
        let dir = TempDir::new().unwrap();
        let meta = write_table(dir.path(), "t.gft");
        let catalog = Catalog::in_memory();
        let ctx = ImportContext::new(&catalog, dir.path());
        let config = FormatDescriptor::parse(&format!(
            "key_format=S,value_format=S,import=(enabled,file_metadata=({}))",
            export(&meta)
        ))
        .unwrap();

        let mut installed = 0;
        let outcome = import_table(&ctx, "table:t", &config, |entry, _, rows| {
            assert_eq!(entry.uri, "table:t");
            installed = rows.len();
        })
        .unwrap();

        assert_eq!(installed, 3);
        assert_eq!(outcome.report.entries, 3);
        assert_eq!(outcome.entry.checkpoint_generation, 2);
        assert!(!outcome.entry.config.contains("import"));
        assert_eq!(outcome.states.last(), Some(&ImportState::Committed));
        assert!(catalog.contains("table:t"));
    }

    #[test]
    fn test_import_not_enabled() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::in_memory();
        let ctx = ImportContext::new(&catalog, dir.path());
        let config = FormatDescriptor::parse("import=(repair)").unwrap();
        let err = import_table(&ctx, "table:t", &config, |_, _, _| {}).unwrap_err();
        assert!(matches!(err, ImportError::InvalidConfig { .. }));
    }

    #[test]
    fn test_stable_timestamp_guard() {
        let dir = TempDir::new().unwrap();
        write_table(dir.path(), "t.gft");
        let catalog = Catalog::in_memory();
        let ctx = ImportContext::new(&catalog, dir.path()).with_stable_timestamp(Timestamp::new(20));
        let request = ImportRequest::new("table:t").with_repair(true);
        let err = run_import(&ctx, &request, &FormatDescriptor::new(), |_, _, _| {
            panic!("must not install")
        })
        .unwrap_err();
        assert!(matches!(err, ImportError::TimestampsPastStable { .. }));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_name_conflict_before_probe() {
        let dir = TempDir::new().unwrap();
        write_table(dir.path(), "t.gft");
        let catalog = Catalog::in_memory();
        let ctx = ImportContext::new(&catalog, dir.path());
        let request = ImportRequest::new("table:t").with_repair(true);
        run_import(&ctx, &request, &FormatDescriptor::new(), |_, _, _| {}).unwrap();
        let err = run_import(&ctx, &request, &FormatDescriptor::new(), |_, _, _| {}).unwrap_err();
        assert!(matches!(err, ImportError::NameConflict { .. }));
    }

    #[test]
    fn test_import_by_file_uri() {
        let dir = TempDir::new().unwrap();
        write_table(dir.path(), "raw.gft");
        let catalog = Catalog::in_memory();
        let ctx = ImportContext::new(&catalog, dir.path());
        let request = ImportRequest::new("file:raw.gft").with_repair(true);
        let outcome = run_import(&ctx, &request, &FormatDescriptor::new(), |_, _, _| {}).unwrap();
        assert_eq!(outcome.entry.file_name, "raw.gft");
    }

    #[test]
    fn test_missing_metadata_before_probe() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::in_memory();
        let ctx = ImportContext::new(&catalog, dir.path());
        let request = ImportRequest::new("table:absent");
        let err = run_import(&ctx, &request, &FormatDescriptor::new(), |_, _, _| {}).unwrap_err();
        assert!(matches!(err, ImportError::MissingMetadata { ref uri } if uri == "table:absent"));

        std::fs::write(dir.path().join("junk.gft"), b"not a data file").unwrap();
        let request = ImportRequest::new("table:junk");
        let err = run_import(&ctx, &request, &FormatDescriptor::new(), |_, _, _| {}).unwrap_err();
        assert!(matches!(err, ImportError::MissingMetadata { .. }));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_late_failure_leaves_id_gap() {
        let dir = TempDir::new().unwrap();
        write_table(dir.path(), "t.gft");
        let catalog = Catalog::in_memory();
        let request = ImportRequest::new("table:t").with_repair(true);

        let guarded = ImportContext::new(&catalog, dir.path()).with_stable_timestamp(Timestamp::new(20));
        assert!(run_import(&guarded, &request, &FormatDescriptor::new(), |_, _, _| {}).is_err());

        let ctx = ImportContext::new(&catalog, dir.path());
        let outcome = run_import(&ctx, &request, &FormatDescriptor::new(), |_, _, _| {}).unwrap();
        assert_eq!(outcome.entry.backing_file_id, FileId::new(2));
    }
}
