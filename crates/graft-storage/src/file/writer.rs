//! Data file writer.
//!
//! A checkpoint writes a table's entire tree into a temporary file next to
//! the target, syncs it, and renames it into place, so a data file on disk
//! is always a complete image of exactly one checkpoint.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use graft_common::constants::PAGE_HEADER_SIZE;
use graft_common::types::{PageId, Timestamp};

use super::compress::compress;
use super::metadata::{BlockAddr, CheckpointRecord, FileMetadata};
use crate::error::{StorageError, StorageResult};
use crate::page::{
    compute_page_checksum, encode_internal, encode_leaf, InternalEntry, LeafEntry, PageFlags,
    PageHeader, PageType, CHECKSUM_OFFSET, MAX_VERSIONS_PER_ENTRY,
};

/// Statistics about a written image.
#[derive(Debug, Clone)]
pub struct WriteSummary {
    /// Metadata as written, including the checkpoint record.
    pub metadata: FileMetadata,
    /// Leaf pages written.
    pub leaf_pages: u64,
    /// Internal pages written.
    pub internal_pages: u64,
    /// Total bytes in the image.
    pub bytes_written: u64,
}

impl WriteSummary {
    /// Total pages written.
    pub fn pages_written(&self) -> u64 {
        self.leaf_pages + self.internal_pages
    }
}

/// Writes one complete data file image.
///
/// # Example
///
/// ```rust,no_run
/// use graft_storage::{DataFileWriter, FileMetadata, LeafEntry, VersionRecord};
/// use graft_common::types::{FileId, Timestamp};
///
/// let meta = FileMetadata::new(FileId::new(1));
/// let rows = vec![LeafEntry::new(
///     &b"1"[..],
///     vec![VersionRecord::value(Timestamp::new(10), Timestamp::MAX, &b"A"[..])],
/// )];
/// let summary = DataFileWriter::create("t.gft", meta, 1)?.write_tree(rows)?;
/// assert_eq!(summary.metadata.checkpoint.entry_count, 1);
/// # Ok::<(), graft_storage::StorageError>(())
/// ```
pub struct DataFileWriter {
    path: PathBuf,
    tmp_path: PathBuf,
    file: BufWriter<File>,
    metadata: FileMetadata,
    generation: u64,
    pos: u64,
    next_page_id: PageId,
    leaf_pages: u64,
    internal_pages: u64,
    finished: bool,
}

impl DataFileWriter {
    /// Starts an image that replaces `path` when finished.
    pub fn create(path: impl AsRef<Path>, metadata: FileMetadata, generation: u64) -> StorageResult<Self> {
        metadata.validate()?;

        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = temp_path_for(&path);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;

        let pos = u64::from(metadata.allocation_size);
        let mut file = BufWriter::new(file);
        file.seek(SeekFrom::Start(pos))?;

        Ok(Self {
            path,
            tmp_path,
            file,
            metadata,
            generation,
            pos,
            next_page_id: PageId::FIRST,
            leaf_pages: 0,
            internal_pages: 0,
            finished: false,
        })
    }

    /// Starts an image for a file that must not exist yet.
    pub fn create_new(path: impl AsRef<Path>, metadata: FileMetadata, generation: u64) -> StorageResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(StorageError::FileExists {
                path: path.to_path_buf(),
            });
        }
        Self::create(path, metadata, generation)
    }

    /// Writes the tree for `entries` (ascending, unique keys) and installs
    /// the image.
    ///
    /// On error the target file is left untouched.
    pub fn write_tree<I>(mut self, entries: I) -> StorageResult<WriteSummary>
    where
        I: IntoIterator<Item = LeafEntry>,
    {
        let leaf_capacity = self.metadata.page_sizing.leaf_max as usize - PAGE_HEADER_SIZE;
        let mut children: Vec<InternalEntry> = Vec::new();
        let mut pending: Vec<LeafEntry> = Vec::new();
        let mut pending_bytes = 0usize;
        let mut entry_count = 0u64;
        let mut newest = Timestamp::ZERO;
        let mut last_key: Option<Bytes> = None;

        for entry in entries {
            if let Some(last) = &last_key {
                if entry.key <= *last {
                    return Err(StorageError::invalid_metadata(
                        "entries",
                        "keys must be written in strictly ascending order",
                    ));
                }
            }
            if entry.versions.len() > MAX_VERSIONS_PER_ENTRY {
                return Err(StorageError::invalid_metadata(
                    "versions",
                    format!(
                        "{} versions of one key exceeds the limit of {}",
                        entry.versions.len(),
                        MAX_VERSIONS_PER_ENTRY
                    ),
                ));
            }
            last_key = Some(entry.key.clone());
            entry_count += 1;
            newest = newest.max(entry.newest_timestamp());

            let len = entry.encoded_len();
            if !pending.is_empty()
                && (pending_bytes + len > leaf_capacity || pending.len() == usize::from(u16::MAX))
            {
                children.push(self.write_leaf(&pending)?);
                pending.clear();
                pending_bytes = 0;
            }
            pending_bytes += len;
            pending.push(entry);
        }
        if !pending.is_empty() {
            children.push(self.write_leaf(&pending)?);
        }

        let internal_capacity = self.metadata.page_sizing.internal_max as usize - PAGE_HEADER_SIZE;
        let mut level = 1u8;
        while children.len() > 1 {
            let mut parents = Vec::new();
            let mut group: Vec<InternalEntry> = Vec::new();
            let mut group_bytes = 0usize;
            for child in children {
                let len = child.encoded_len();
                // An internal page needs at least two children to make progress.
                if group.len() >= 2
                    && (group_bytes + len > internal_capacity
                        || group.len() == usize::from(u16::MAX))
                {
                    parents.push(self.write_internal(&group, level)?);
                    group.clear();
                    group_bytes = 0;
                }
                group_bytes += len;
                group.push(child);
            }
            if !group.is_empty() {
                // A lone trailing child still gets its own parent so every
                // leaf sits at the same depth.
                parents.push(self.write_internal(&group, level)?);
            }
            children = parents;
            level = level.checked_add(1).ok_or_else(|| {
                StorageError::invalid_metadata("entries", "tree exceeds 255 levels")
            })?;
        }

        let root = children.first().map_or(BlockAddr::NONE, |c| c.child);
        self.finish(root, entry_count, newest)
    }

    fn write_leaf(&mut self, entries: &[LeafEntry]) -> StorageResult<InternalEntry> {
        let mut payload = BytesMut::with_capacity(entries.iter().map(LeafEntry::encoded_len).sum());
        encode_leaf(entries, &mut payload)?;

        let mut flags = PageFlags::empty();
        if entries.iter().any(LeafEntry::has_tombstone) {
            flags.set(PageFlags::HAS_TOMBSTONES);
        }
        let addr = self.write_page(PageType::Leaf, 0, flags, entries.len() as u16, &payload)?;
        self.leaf_pages += 1;
        Ok(InternalEntry {
            first_key: entries[0].key.clone(),
            child: addr,
        })
    }

    fn write_internal(&mut self, entries: &[InternalEntry], level: u8) -> StorageResult<InternalEntry> {
        let mut payload = BytesMut::with_capacity(entries.iter().map(InternalEntry::encoded_len).sum());
        encode_internal(entries, &mut payload)?;

        let addr = self.write_page(
            PageType::Internal,
            level,
            PageFlags::empty(),
            entries.len() as u16,
            &payload,
        )?;
        self.internal_pages += 1;
        Ok(InternalEntry {
            first_key: entries[0].first_key.clone(),
            child: addr,
        })
    }

    fn write_page(
        &mut self,
        page_type: PageType,
        level: u8,
        mut flags: PageFlags,
        entry_count: u16,
        raw: &[u8],
    ) -> StorageResult<BlockAddr> {
        let compressed = match self.metadata.compressor {
            Some(compressor) => {
                let packed = compress(compressor, raw)?;
                (packed.len() < raw.len()).then_some(packed)
            }
            None => None,
        };
        if compressed.is_some() {
            flags.set(PageFlags::COMPRESSED);
        }
        let payload = compressed.as_deref().unwrap_or(raw);

        let alloc = self.metadata.allocation_size as usize;
        let used = PAGE_HEADER_SIZE + payload.len();
        let size = used.div_ceil(alloc) * alloc;
        let size32 = u32::try_from(size).map_err(|_| {
            StorageError::invalid_metadata("entries", format!("page of {} bytes too large", size))
        })?;

        let mut header = PageHeader::new(page_type, level, self.next_page_id, self.generation);
        header.flags = flags;
        header.entry_count = entry_count;
        header.payload_len = payload.len() as u32;

        let mut block = vec![0u8; size];
        header.encode(&mut block[..PAGE_HEADER_SIZE]);
        block[PAGE_HEADER_SIZE..used].copy_from_slice(payload);
        if self.metadata.checksum_mode.covers(flags.is_compressed()) {
            let checksum = compute_page_checksum(&block, CHECKSUM_OFFSET);
            block[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&checksum.to_le_bytes());
        }

        self.file.write_all(&block)?;
        let addr = BlockAddr::new(self.pos, size32);
        self.pos += size as u64;
        self.next_page_id = self.next_page_id.next();
        Ok(addr)
    }

    fn finish(mut self, root: BlockAddr, entry_count: u64, newest: Timestamp) -> StorageResult<WriteSummary> {
        self.metadata.checkpoint = CheckpointRecord {
            generation: self.generation,
            root,
            entry_count,
            newest_timestamp: newest,
            file_size: self.pos,
        };

        let descriptor = self.metadata.encode_descriptor();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&descriptor)?;
        self.file.flush()?;
        self.file.get_ref().sync_all()?;

        std::fs::rename(&self.tmp_path, &self.path)?;
        self.finished = true;
        sync_parent_dir(&self.path);

        debug!(
            path = %self.path.display(),
            generation = self.generation,
            entries = entry_count,
            leaf_pages = self.leaf_pages,
            internal_pages = self.internal_pages,
            bytes = self.pos,
            "data file image written"
        );

        Ok(WriteSummary {
            metadata: self.metadata.clone(),
            leaf_pages: self.leaf_pages,
            internal_pages: self.internal_pages,
            bytes_written: self.pos,
        })
    }
}

impl Drop for DataFileWriter {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = std::fs::remove_file(&self.tmp_path) {
                warn!(path = %self.tmp_path.display(), error = %e, "failed to remove partial image");
            }
        }
    }
}

impl std::fmt::Debug for DataFileWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFileWriter")
            .field("path", &self.path)
            .field("generation", &self.generation)
            .field("pos", &self.pos)
            .finish()
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn sync_parent_dir(path: &Path) {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
        debug!(dir = %parent.display(), error = %e, "directory sync skipped");
    }
}
