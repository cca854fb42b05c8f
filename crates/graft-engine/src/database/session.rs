//! Sessions.
//!
//! A session is the handle through which tables are created, imported,
//! exported and read. Sessions are cheap and carry no state of their own
//! beyond an id for logging; every session of a database sees the same
//! catalog.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use graft_catalog::catalog::data_file_name;
use graft_catalog::descriptor::ID_KEY;
use graft_catalog::import::{file_metadata_from_config, physical_entries, IMPORT_KEY};
use graft_catalog::{
    run_import, CatalogEntry, CreatedVia, FormatDescriptor, ImportError, ImportOutcome,
    ImportRequest, Schema, VerifyReport,
};
use graft_common::constants::FILE_URI_PREFIX;
use graft_storage::DataFileWriter;

use super::engine::Database;
use crate::checkpoint::CheckpointInfo;
use crate::error::{EngineError, EngineResult};
use crate::table::cursor::split_projection;
use crate::table::{Cursor, Table};

/// Generation written into a freshly created data file.
const INITIAL_GENERATION: u64 = 1;

/// Unique session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Creates a new session ID.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric ID.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session_{}", self.0)
    }
}

/// A handle on a database.
#[derive(Debug, Clone, Copy)]
pub struct Session<'db> {
    id: SessionId,
    db: &'db Database,
}

impl<'db> Session<'db> {
    pub(crate) fn new(id: SessionId, db: &'db Database) -> Self {
        Self { id, db }
    }

    /// Returns the session ID.
    pub fn id(&self) -> SessionId {
        self.id
    }

    // =========================================================================
    // Create and Import
    // =========================================================================

    /// Creates a table, or attaches an existing data file when `config`
    /// carries `import=(enabled=true,…)`.
    pub fn create(&self, uri: &str, config: &str) -> EngineResult<()> {
        self.db.ensure_open()?;
        let desc = FormatDescriptor::parse(config)?;
        match ImportRequest::from_config(uri, &desc)? {
            Some((request, dest)) if request.enabled => {
                self.import(&request, &dest)?;
                Ok(())
            }
            Some((_, dest)) => self.create_native(uri, dest),
            None => self.create_native(uri, desc),
        }
    }

    /// Imports the data file of `uri`.
    ///
    /// With `Some(config)`, the exported configuration serves as both the
    /// table configuration and the file metadata. With `None`, the table is
    /// rebuilt from the file alone (repair mode).
    pub fn live_import(&self, uri: &str, config: Option<&str>) -> EngineResult<ImportOutcome> {
        self.db.ensure_open()?;
        let (request, dest) = match config {
            Some(config) => {
                let mut desc = FormatDescriptor::parse(config)?;
                desc.remove(IMPORT_KEY);
                (ImportRequest::new(uri).with_file_metadata(desc.clone()), desc)
            }
            None => (ImportRequest::new(uri).with_repair(true), FormatDescriptor::new()),
        };
        self.import(&request, &dest)
    }

    fn import(&self, request: &ImportRequest, dest: &FormatDescriptor) -> EngineResult<ImportOutcome> {
        debug!(session = %self.id, uri = %request.destination_uri, repair = request.repair, "import requested");
        let ctx = self.db.import_context();
        let data_dir = self.db.data_dir();
        let outcome = run_import(&ctx, request, dest, |entry, metadata, rows| {
            let path = data_dir.join(&entry.file_name);
            self.db
                .install_table(Table::new(entry.clone(), metadata.clone(), rows, path));
        })?;
        Ok(outcome)
    }

    fn create_native(&self, uri: &str, mut config: FormatDescriptor) -> EngineResult<()> {
        let catalog = self.db.catalog();
        let file_name = data_file_name(uri)?;
        let path = self.db.data_dir().join(&file_name);

        let _reservation = catalog.reserve_file(&path);
        if catalog.contains(uri) {
            return Err(ImportError::NameConflict { uri: uri.to_string() }.into());
        }

        let file_id = catalog.allocate_file_id();
        let metadata = file_metadata_from_config(&config, file_id, &self.db.config().table_defaults)?;
        for (key, value) in physical_entries(&metadata) {
            config.set_default(key, value);
        }
        config.set_default("key_format", metadata.key_format.as_str());
        config.set_default("value_format", metadata.value_format.as_str());
        let id = i64::try_from(file_id.as_u64())
            .map_err(|_| ImportError::invalid_config(ID_KEY, "file id space exhausted"))?;
        config.set(ID_KEY, id);
        Schema::from_config(&config)?.check_columns()?;

        let summary = DataFileWriter::create_new(&path, metadata, INITIAL_GENERATION)?.write_tree(Vec::new())?;
        let entry = CatalogEntry {
            uri: uri.to_string(),
            config,
            backing_file_id: file_id,
            created_via: CreatedVia::Native,
            checkpoint_generation: INITIAL_GENERATION,
            file_name,
        };
        let committed = catalog.commit_with(entry, |entry| {
            self.db.install_table(Table::new(
                entry.clone(),
                summary.metadata.clone(),
                Vec::new(),
                path.clone(),
            ));
        });
        match committed {
            Ok(entry) => {
                info!(session = %self.id, uri, file_id = %entry.backing_file_id, "table created");
                Ok(())
            }
            Err(e) => {
                // The file was created above and nothing references it.
                let _ = std::fs::remove_file(&path);
                Err(e.into())
            }
        }
    }

    // =========================================================================
    // Metadata and Verification
    // =========================================================================

    /// Returns a table's configuration string.
    ///
    /// For a `file:` URI naming the data file of another entry, returns the
    /// file-level view of that entry instead.
    pub fn metadata(&self, uri: &str) -> EngineResult<String> {
        let catalog = self.db.catalog();
        if let Some(entry) = catalog.get(uri) {
            return Ok(entry.config_string());
        }
        if let Some(name) = uri.strip_prefix(FILE_URI_PREFIX) {
            if let Some(entry) = catalog.entry_for_file(name) {
                return Ok(entry.file_view().render());
            }
        }
        Err(EngineError::table_not_found(uri))
    }

    fn resolve(&self, uri: &str) -> EngineResult<Arc<Table>> {
        if let Some(table) = self.db.table(uri) {
            return Ok(table);
        }
        uri.strip_prefix(FILE_URI_PREFIX)
            .and_then(|name| self.db.catalog().entry_for_file(name))
            .and_then(|entry| self.db.table(&entry.uri))
            .ok_or_else(|| EngineError::table_not_found(uri))
    }

    /// Walks a table's data file and checks its structure.
    pub fn verify(&self, uri: &str) -> EngineResult<VerifyReport> {
        self.db.ensure_open()?;
        let table = self.resolve(uri)?;
        let report = table.verify(Some(self.db.interrupt_flag()))?;
        debug!(session = %self.id, uri, pages = report.pages, entries = report.entries, "table verified");
        Ok(report)
    }

    /// Checkpoints every table.
    pub fn checkpoint(&self) -> EngineResult<CheckpointInfo> {
        self.db.checkpoint()
    }

    // =========================================================================
    // Cursors
    // =========================================================================

    /// Opens a cursor on `uri`, optionally projected as `table:name(col,…)`.
    pub fn open_cursor(&self, uri: &str) -> EngineResult<Cursor> {
        self.db.ensure_open()?;
        let (base, columns) = split_projection(uri);
        let table = self.resolve(base)?;
        Cursor::new(table, columns.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_common::config::EngineConfig;
    use graft_common::error::ErrorCode;
    use graft_common::types::Timestamp;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> Database {
        Database::open(EngineConfig::with_data_dir(dir.path())).unwrap()
    }

    #[test]
    fn test_native_create_fills_physical_keys() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        let session = db.session();
        session
            .create("table:t", "key_format=S,value_format=S,allocation_size=8KB,internal_page_max=8KB")
            .unwrap();

        let config = FormatDescriptor::parse(&session.metadata("table:t").unwrap()).unwrap();
        assert_eq!(config.get_str("key_format"), Some("S"));
        assert_eq!(config.get_int("allocation_size"), Some(8192));
        assert_eq!(config.get_str("checksum"), Some("uncompressed"));
        assert_eq!(config.get_int("id"), Some(1));
        assert!(dir.path().join("t.gft").is_file());
    }

    #[test]
    fn test_native_create_conflicts() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        let session = db.session();
        session.create("table:t", "").unwrap();
        let err = session.create("table:t", "").unwrap_err();
        assert_eq!(err.code(), ErrorCode::NameConflict);

        let err = session.create("table:bad", "allocation_size=1000").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidConfig);
        assert!(!dir.path().join("bad.gft").exists());
    }

    #[test]
    fn test_disabled_import_group_creates_native() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        let session = db.session();
        session
            .create("table:t", "key_format=u,import=(enabled=false)")
            .unwrap();
        let config = session.metadata("table:t").unwrap();
        assert!(!config.contains("import"));
    }

    #[test]
    fn test_import_of_missing_file() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        let err = db
            .session()
            .create("table:t", "import=(enabled=true,repair=true)")
            .unwrap_err();
        assert!(matches!(err.as_import(), Some(ImportError::NotAValidDataFile { .. })));
        assert!(db.catalog().is_empty());
    }

    #[test]
    fn test_file_view() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        let session = db.session();
        session
            .create("table:t", "key_format=S,value_format=S,app_metadata=hello")
            .unwrap();

        let view = FormatDescriptor::parse(&session.metadata("file:t.gft").unwrap()).unwrap();
        assert_eq!(view.get_str("app_metadata"), Some("hello"));
        assert_eq!(view.get_str("key_format"), Some("S"));
        assert!(view.contains("allocation_size"));
        assert!(view.contains("id"));
        assert!(matches!(
            session.metadata("file:other.gft"),
            Err(EngineError::TableNotFound { .. })
        ));
    }

    #[test]
    fn test_verify_and_cursor_through_file_uri() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        let session = db.session();
        session.create("table:t", "").unwrap();
        session
            .open_cursor("table:t")
            .unwrap()
            .insert(b"a", b"1", Timestamp::new(3))
            .unwrap();
        session.checkpoint().unwrap();

        let report = session.verify("file:t.gft").unwrap();
        assert_eq!(report.entries, 1);
        let cursor = session.open_cursor("file:t.gft").unwrap();
        assert_eq!(cursor.uri(), "table:t");
        assert!(matches!(
            session.open_cursor("table:none"),
            Err(EngineError::TableNotFound { .. })
        ));
    }

    #[test]
    fn test_interrupted_verify() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        let session = db.session();
        session.create("table:t", "").unwrap();
        session
            .open_cursor("table:t")
            .unwrap()
            .insert(b"k", b"v", Timestamp::new(1))
            .unwrap();
        session.checkpoint().unwrap();
        db.interrupt();
        let err = session.verify("table:t").unwrap_err();
        assert!(matches!(err.as_import(), Some(ImportError::Interrupted { .. })));
        db.clear_interrupt();
        assert!(session.verify("table:t").is_ok());
    }

    #[test]
    fn test_hot_key_history_stays_checkpointable() {
        let dir = TempDir::new().unwrap();
        let limit = graft_storage::MAX_VERSIONS_PER_ENTRY as u64;
        {
            let db = open(&dir);
            let session = db.session();
            session.create("table:t", "").unwrap();
            let cursor = session.open_cursor("table:t").unwrap();
            for t in 1..=limit {
                cursor.insert(b"hot", b"v", Timestamp::new(t)).unwrap();
            }
            let err = cursor.insert(b"hot", b"v", Timestamp::new(limit + 1)).unwrap_err();
            assert_eq!(err.code(), ErrorCode::HistoryFull);

            session.checkpoint().unwrap();
            assert_eq!(session.verify("table:t").unwrap().entries, 1);
            db.close().unwrap();
        }

        let db = open(&dir);
        let cursor = db.session().open_cursor("table:t").unwrap();
        assert_eq!(cursor.search(b"hot", Timestamp::new(1)).as_deref(), Some(&b"v"[..]));
        assert_eq!(db.table("table:t").unwrap().store().key_count(), 1);
    }
}
