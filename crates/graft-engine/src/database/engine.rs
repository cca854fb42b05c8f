//! Main database engine.
//!
//! The `Database` struct is the top-level entry point for GraftDB. It owns
//! the catalog, the live tables and the checkpoint manager, and hands out
//! sessions.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{info, warn};

use graft_catalog::{Catalog, ImportContext};
use graft_common::config::EngineConfig;
use graft_common::types::Timestamp;

use super::session::{Session, SessionId};
use crate::checkpoint::{CheckpointInfo, CheckpointManager};
use crate::error::{EngineError, EngineResult};
use crate::table::Table;

/// Database statistics.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    /// Total sessions created.
    pub total_sessions: u64,
    /// Registered tables.
    pub total_tables: usize,
    /// Distinct keys across all tables.
    pub total_keys: usize,
    /// Checkpoints completed since open.
    pub checkpoints: u64,
    /// Uptime.
    pub uptime: Duration,
}

/// The main database engine.
pub struct Database {
    /// Configuration.
    config: EngineConfig,
    /// Durable table namespace.
    catalog: Catalog,
    /// Live tables by URI.
    tables: DashMap<String, Arc<Table>>,
    /// Checkpoint coordination.
    checkpoints: CheckpointManager,
    /// Stable timestamp, 0 when unset.
    stable_timestamp: AtomicU64,
    /// Set to abandon running imports and verifications.
    interrupt: AtomicBool,
    /// Whether `close` has run.
    closed: AtomicBool,
    /// Next session ID.
    next_session_id: AtomicU64,
    /// When the database was opened.
    started_at: Instant,
}

impl Database {
    /// Opens the database in `config.data_dir`, loading every registered
    /// table into memory.
    pub fn open(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let data_dir = config.data_dir.clone();
        if !data_dir.is_dir() {
            if !config.create_if_missing {
                return Err(EngineError::DataDirMissing { path: data_dir });
            }
            std::fs::create_dir_all(&data_dir).map_err(|source| EngineError::Io {
                path: data_dir.clone(),
                source,
            })?;
        }

        let catalog = Catalog::open(&data_dir)?;
        let tables = DashMap::new();
        for entry in catalog.entries() {
            let uri = entry.uri.clone();
            let table = Table::load(&data_dir, entry)?;
            if config.verify_on_open {
                table.verify(None)?;
            }
            tables.insert(uri, Arc::new(table));
        }

        info!(
            data_dir = %data_dir.display(),
            tables = tables.len(),
            verified = config.verify_on_open,
            "database opened"
        );

        Ok(Self {
            config,
            catalog,
            tables,
            checkpoints: CheckpointManager::new(),
            stable_timestamp: AtomicU64::new(0),
            interrupt: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            next_session_id: AtomicU64::new(1),
            started_at: Instant::now(),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the data directory.
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Returns the catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    // =========================================================================
    // Session Management
    // =========================================================================

    /// Creates a new session.
    pub fn session(&self) -> Session<'_> {
        let id = SessionId::new(self.next_session_id.fetch_add(1, Ordering::SeqCst));
        Session::new(id, self)
    }

    // =========================================================================
    // Tables
    // =========================================================================

    /// Returns a live table.
    pub fn table(&self, uri: &str) -> Option<Arc<Table>> {
        self.tables.get(uri).map(|t| t.clone())
    }

    /// Returns every live table, in URI order.
    pub fn tables(&self) -> Vec<Arc<Table>> {
        let mut tables: Vec<(String, Arc<Table>)> = self
            .tables
            .iter()
            .map(|t| (t.key().clone(), t.value().clone()))
            .collect();
        tables.sort_by(|a, b| a.0.cmp(&b.0));
        tables.into_iter().map(|(_, t)| t).collect()
    }

    /// Publishes a freshly committed table. Runs under the catalog lock.
    pub(crate) fn install_table(&self, table: Table) {
        self.tables.insert(table.uri(), Arc::new(table));
    }

    // =========================================================================
    // Timestamps and Interrupts
    // =========================================================================

    /// Sets the stable timestamp imports are checked against.
    pub fn set_stable_timestamp(&self, ts: Timestamp) {
        self.stable_timestamp.store(ts.as_u64(), Ordering::Release);
    }

    /// Returns the stable timestamp, if one has been set.
    pub fn stable_timestamp(&self) -> Option<Timestamp> {
        match self.stable_timestamp.load(Ordering::Acquire) {
            0 => None,
            ts => Some(Timestamp::new(ts)),
        }
    }

    /// Asks running imports and verifications to stop at the next page.
    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::Release);
    }

    /// Clears a previous interrupt.
    pub fn clear_interrupt(&self) {
        self.interrupt.store(false, Ordering::Release);
    }

    pub(crate) fn interrupt_flag(&self) -> &AtomicBool {
        &self.interrupt
    }

    pub(crate) fn import_context(&self) -> ImportContext<'_> {
        let mut ctx = ImportContext::new(&self.catalog, self.data_dir()).with_interrupt(&self.interrupt);
        if let Some(ts) = self.stable_timestamp() {
            ctx = ctx.with_stable_timestamp(ts);
        }
        ctx
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    pub(crate) fn ensure_open(&self) -> EngineResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::Closed);
        }
        Ok(())
    }

    /// Rewrites every table's data file and records the new generations.
    pub fn checkpoint(&self) -> EngineResult<CheckpointInfo> {
        self.ensure_open()?;
        self.checkpoints.checkpoint(&self.tables(), &self.catalog)
    }

    /// Returns the checkpoint manager.
    pub fn checkpoint_manager(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Returns database statistics.
    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            total_sessions: self.next_session_id.load(Ordering::Relaxed) - 1,
            total_tables: self.tables.len(),
            total_keys: self.tables.iter().map(|t| t.store().key_count()).sum(),
            checkpoints: self
                .checkpoints
                .last_checkpoint()
                .map_or(0, |info| info.checkpoint_id),
            uptime: self.started_at.elapsed(),
        }
    }

    /// Closes the database, taking a final checkpoint when configured.
    ///
    /// Closing twice is a no-op.
    pub fn close(&self) -> EngineResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if self.config.checkpoint_on_close && !self.tables.is_empty() {
            self.checkpoints.checkpoint(&self.tables(), &self.catalog)?;
        }
        info!(data_dir = %self.data_dir().display(), "database closed");
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "final checkpoint failed");
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("data_dir", &self.config.data_dir)
            .field("tables", &self.tables.len())
            .field("stable_timestamp", &self.stable_timestamp())
            .finish()
    }
}
