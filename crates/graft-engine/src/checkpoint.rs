//! Checkpoint management.
//!
//! A checkpoint rewrites every table's data file as a complete image of its
//! current rows, then records the new generations in the catalog. Data files
//! are replaced by rename, so each one on disk is always a whole image of a
//! single checkpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use graft_catalog::Catalog;
use graft_storage::DataFileWriter;

use crate::error::{EngineError, EngineResult};
use crate::table::Table;

/// Checkpoint state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointState {
    /// No checkpoint in progress.
    Idle,
    /// Data files are being rewritten.
    InProgress,
    /// The catalog is being updated.
    Completing,
}

/// Information about a completed checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointInfo {
    /// Checkpoint ID, increasing per manager.
    pub checkpoint_id: u64,
    /// Tables written.
    pub tables: usize,
    /// Pages written across all tables.
    pub pages_written: u64,
    /// Bytes written across all tables.
    pub bytes_written: u64,
    /// Time taken.
    pub duration: Duration,
}

/// Coordinates checkpoints so only one runs at a time.
#[derive(Debug)]
pub struct CheckpointManager {
    state: Mutex<CheckpointState>,
    next_checkpoint_id: AtomicU64,
    last_checkpoint: Mutex<Option<CheckpointInfo>>,
}

/// Returns the manager to `Idle` however the checkpoint ends.
struct RunningCheckpoint<'a> {
    state: &'a Mutex<CheckpointState>,
}

impl RunningCheckpoint<'_> {
    fn set(&self, next: CheckpointState) {
        *self.state.lock() = next;
    }
}

impl Drop for RunningCheckpoint<'_> {
    fn drop(&mut self) {
        *self.state.lock() = CheckpointState::Idle;
    }
}

impl Default for CheckpointManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointManager {
    /// Creates an idle manager.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CheckpointState::Idle),
            next_checkpoint_id: AtomicU64::new(1),
            last_checkpoint: Mutex::new(None),
        }
    }

    /// Returns the current checkpoint state.
    pub fn state(&self) -> CheckpointState {
        *self.state.lock()
    }

    /// Returns true if a checkpoint is in progress.
    pub fn is_in_progress(&self) -> bool {
        self.state() != CheckpointState::Idle
    }

    /// Returns the last completed checkpoint.
    pub fn last_checkpoint(&self) -> Option<CheckpointInfo> {
        self.last_checkpoint.lock().clone()
    }

    fn begin(&self) -> EngineResult<RunningCheckpoint<'_>> {
        let mut state = self.state.lock();
        if *state != CheckpointState::Idle {
            return Err(EngineError::CheckpointInProgress);
        }
        *state = CheckpointState::InProgress;
        Ok(RunningCheckpoint { state: &self.state })
    }

    /// Writes every table and records the new generations in `catalog`.
    ///
    /// A failure part way leaves already-rewritten files in place with a
    /// generation newer than the catalog records; their contents are still
    /// complete images.
    pub fn checkpoint(&self, tables: &[Arc<Table>], catalog: &Catalog) -> EngineResult<CheckpointInfo> {
        let running = self.begin()?;
        let start = Instant::now();
        let checkpoint_id = self.next_checkpoint_id.fetch_add(1, Ordering::AcqRel);

        let mut generations = Vec::with_capacity(tables.len());
        let mut pages_written = 0;
        let mut bytes_written = 0;
        for table in tables {
            let entry = table.entry();
            let generation = entry.checkpoint_generation + 1;
            let mut metadata = table.metadata();
            metadata.file_id = entry.backing_file_id;

            let summary = DataFileWriter::create(table.path(), metadata, generation)?
                .write_tree(table.store().to_leaf_entries())?;
            debug!(
                uri = %entry.uri,
                generation,
                entries = summary.metadata.checkpoint.entry_count,
                pages = summary.pages_written(),
                "table checkpointed"
            );
            pages_written += summary.pages_written();
            bytes_written += summary.bytes_written;
            table.set_metadata(summary.metadata);
            generations.push((entry.uri.clone(), generation));
        }

        running.set(CheckpointState::Completing);
        catalog.record_checkpoint(&generations)?;
        for table in tables {
            if let Some(entry) = catalog.get(&table.uri()) {
                table.set_entry(entry);
            }
        }

        let info = CheckpointInfo {
            checkpoint_id,
            tables: tables.len(),
            pages_written,
            bytes_written,
            duration: start.elapsed(),
        };
        info!(
            checkpoint_id,
            tables = info.tables,
            pages = info.pages_written,
            bytes = info.bytes_written,
            elapsed_ms = info.duration.as_millis() as u64,
            "checkpoint complete"
        );
        *self.last_checkpoint.lock() = Some(info.clone());
        Ok(info)
    }
}
