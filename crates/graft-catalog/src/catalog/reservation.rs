//! Per-file reservations.
//!
//! An import holds an exclusive reservation on its source file from the
//! moment it probes the file until its catalog commit finishes. A second
//! import of the same file blocks until the first is done and then sees the
//! first import's result in the catalog.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use tracing::trace;

type Slots = Arc<DashMap<PathBuf, Arc<Mutex<()>>>>;

/// Table of file reservations.
#[derive(Debug, Default)]
pub struct FileReservations {
    slots: Slots,
}

impl FileReservations {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `path`, blocking while another holder has it.
    pub fn reserve(&self, path: &Path) -> FileReservation {
        let slot = self
            .slots
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        trace!(path = %path.display(), "waiting for file reservation");
        let guard = slot.lock_arc();
        FileReservation {
            guard: Some(guard),
            slots: Arc::clone(&self.slots),
            path: path.to_path_buf(),
        }
    }

    /// Returns true if some holder currently has `path` reserved.
    pub fn is_reserved(&self, path: &Path) -> bool {
        self.slots
            .get(path)
            .is_some_and(|slot| slot.is_locked())
    }

    /// Number of paths with a live slot.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no path has a live slot.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// An exclusive reservation, released on drop.
pub struct FileReservation {
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
    slots: Slots,
    path: PathBuf,
}

impl FileReservation {
    /// The reserved path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileReservation {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map still references an idle slot.
        self.slots
            .remove_if(&self.path, |_, slot| Arc::strong_count(slot) == 1);
    }
}

impl std::fmt::Debug for FileReservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileReservation").field("path", &self.path).finish()
    }
}
