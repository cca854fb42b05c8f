//! Structural validation of data files.
//!
//! The validator walks the whole page tree of a data file from the root
//! recorded in its descriptor block, depth first and in key order. It never
//! trusts a pointer before checking it: every child address is bounds
//! checked before it is read and every page is read at most once.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tracing::{debug, warn};

use graft_common::constants::MAX_TREE_DEPTH;
use graft_common::types::Timestamp;
use graft_storage::{BlockAddr, DataFileReader, LeafEntry, StorageError};

use crate::error::{ImportError, ImportResult};

/// What a successful validation saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Pages read.
    pub pages: u64,
    /// Leaf pages read.
    pub leaf_pages: u64,
    /// Internal pages read.
    pub internal_pages: u64,
    /// Rows found.
    pub entries: u64,
    /// Newest timestamp found in any version.
    pub newest_timestamp: Timestamp,
    /// Number of levels in the tree (0 for an empty tree).
    pub max_depth: u32,
}

struct Visit {
    addr: BlockAddr,
    level: Option<u8>,
    lower: Option<Bytes>,
    upper: Option<Bytes>,
    depth: usize,
}

/// Page tree validator over an open reader.
pub struct Validator<'a> {
    reader: &'a DataFileReader,
    interrupt: Option<&'a AtomicBool>,
}

impl<'a> Validator<'a> {
    /// Creates a validator for `reader`.
    pub fn new(reader: &'a DataFileReader) -> Self {
        Self {
            reader,
            interrupt: None,
        }
    }

    /// Stops validation with [`ImportError::Interrupted`] once `flag` is set.
    /// The flag is checked before every page.
    #[must_use]
    pub fn with_interrupt(mut self, flag: &'a AtomicBool) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Validates the file.
    pub fn run(&self) -> ImportResult<VerifyReport> {
        self.walk(None)
    }

    /// Validates the file and returns every row in key order.
    pub fn run_and_collect(&self) -> ImportResult<(VerifyReport, Vec<LeafEntry>)> {
        let mut rows = Vec::new();
        let report = self.walk(Some(&mut rows))?;
        Ok((report, rows))
    }

    fn path(&self) -> &Path {
        self.reader.path()
    }

    fn corrupt(&self, offset: Option<u64>, reason: impl Into<String>) -> ImportError {
        ImportError::corrupt(self.path(), offset, reason)
    }

    fn storage(&self, addr: BlockAddr, err: StorageError) -> ImportError {
        match err {
            StorageError::Io { source } => ImportError::Io {
                path: self.path().to_path_buf(),
                source,
            },
            other => self.corrupt(other.page_offset().or(Some(addr.offset)), other.to_string()),
        }
    }

    fn walk(&self, mut sink: Option<&mut Vec<LeafEntry>>) -> ImportResult<VerifyReport> {
        let meta = self.reader.metadata();
        let record = &meta.checkpoint;
        let key_limit = meta.page_sizing.key_limit();
        let value_limit = meta.page_sizing.value_limit();
        let mut report = VerifyReport::default();

        if self.reader.file_len() < record.file_size {
            return Err(self.corrupt(
                None,
                format!(
                    "file is {} bytes, checkpoint recorded {}",
                    self.reader.file_len(),
                    record.file_size
                ),
            ));
        }
        if record.root.is_none() {
            if record.entry_count != 0 {
                return Err(self.corrupt(
                    None,
                    format!("empty tree but {} entries recorded", record.entry_count),
                ));
            }
            return Ok(report);
        }
        self.reader
            .check_bounds(record.root)
            .map_err(|e| self.storage(record.root, e))?;

        let mut visited: HashSet<u64> = HashSet::new();
        let mut last_key: Option<Bytes> = None;
        let mut stack = vec![Visit {
            addr: record.root,
            level: None,
            lower: None,
            upper: None,
            depth: 0,
        }];

        while let Some(visit) = stack.pop() {
            if self.interrupt.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                warn!(path = %self.path().display(), pages = report.pages, "validation interrupted");
                return Err(ImportError::Interrupted {
                    path: self.path().to_path_buf(),
                    pages_checked: report.pages,
                });
            }

            let addr = visit.addr;
            let at = Some(addr.offset);
            if visit.depth >= MAX_TREE_DEPTH {
                return Err(self.corrupt(at, "tree deeper than the supported maximum"));
            }
            if !visited.insert(addr.offset) {
                return Err(self.corrupt(at, "page referenced more than once"));
            }

            let page = self.reader.read_page(addr).map_err(|e| self.storage(addr, e))?;
            let level = page.header.level;
            if let Some(expected) = visit.level {
                if level != expected {
                    return Err(self.corrupt(
                        at,
                        format!("page at level {} where level {} expected", level, expected),
                    ));
                }
            } else {
                report.max_depth = u32::from(level) + 1;
            }
            report.pages += 1;

            if page.header.page_type.is_leaf() {
                report.leaf_pages += 1;
                let rows = page.leaf_entries().map_err(|e| self.storage(addr, e))?;
                if rows.is_empty() {
                    return Err(self.corrupt(at, "empty leaf page"));
                }
                for row in &rows {
                    if visit.lower.as_ref().is_some_and(|lower| row.key < *lower)
                        || visit.upper.as_ref().is_some_and(|upper| row.key >= *upper)
                    {
                        return Err(self.corrupt(at, "key outside the range of its parent slot"));
                    }
                    if last_key.as_ref().is_some_and(|last| row.key <= *last) {
                        return Err(self.corrupt(at, "keys out of order"));
                    }
                    if key_limit.is_some_and(|max| row.key.len() > max) {
                        return Err(self.corrupt(
                            at,
                            format!("key of {} bytes exceeds leaf_key_max", row.key.len()),
                        ));
                    }
                    let mut prev_start = Timestamp::ZERO;
                    for version in &row.versions {
                        if value_limit.is_some_and(|max| version.value_len() > max) {
                            return Err(self.corrupt(
                                at,
                                format!(
                                    "value of {} bytes exceeds leaf_value_max",
                                    version.value_len()
                                ),
                            ));
                        }
                        if version.start_ts < prev_start {
                            return Err(self.corrupt(at, "versions out of timestamp order"));
                        }
                        prev_start = version.start_ts;
                    }
                    report.newest_timestamp = report.newest_timestamp.max(row.newest_timestamp());
                    last_key = Some(row.key.clone());
                }
                report.entries += rows.len() as u64;
                if let Some(sink) = sink.as_deref_mut() {
                    sink.extend(rows);
                }
            } else {
                report.internal_pages += 1;
                if level == 0 {
                    return Err(self.corrupt(at, "internal page at leaf level"));
                }
                let slots = page.internal_entries().map_err(|e| self.storage(addr, e))?;
                if slots.is_empty() {
                    return Err(self.corrupt(at, "internal page without children"));
                }
                for pair in slots.windows(2) {
                    if pair[0].first_key >= pair[1].first_key {
                        return Err(self.corrupt(at, "separator keys out of order"));
                    }
                }
                if let Some(lower) = &visit.lower {
                    if slots[0].first_key < *lower {
                        return Err(self.corrupt(at, "separator below the range of its parent slot"));
                    }
                }
                for (i, slot) in slots.iter().enumerate().rev() {
                    self.reader
                        .check_bounds(slot.child)
                        .map_err(|e| self.storage(slot.child, e))?;
                    let upper = match slots.get(i + 1) {
                        Some(next) => Some(next.first_key.clone()),
                        None => visit.upper.clone(),
                    };
                    stack.push(Visit {
                        addr: slot.child,
                        level: Some(level - 1),
                        lower: Some(slot.first_key.clone()),
                        upper,
                        depth: visit.depth + 1,
                    });
                }
            }
        }

        if report.entries != record.entry_count {
            return Err(self.corrupt(
                None,
                format!(
                    "found {} entries, checkpoint recorded {}",
                    report.entries, record.entry_count
                ),
            ));
        }
        if report.newest_timestamp > record.newest_timestamp {
            return Err(self.corrupt(
                None,
                format!(
                    "found timestamp {}, checkpoint recorded newest {}",
                    report.newest_timestamp, record.newest_timestamp
                ),
            ));
        }

        debug!(
            path = %self.path().display(),
            pages = report.pages,
            entries = report.entries,
            depth = report.max_depth,
            "validation passed"
        );
        Ok(report)
    }
}
