//! Read-only data file access.
//!
//! The reader never opens a file for writing, so probing and verifying an
//! import candidate leaves the source untouched even on shared media.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::Mutex;

use graft_common::constants::{DESCRIPTOR_BLOCK_MIN_SIZE, MAX_TREE_DEPTH, PAGE_HEADER_SIZE};

use super::compress::decompress;
use super::metadata::{BlockAddr, FileMetadata};
use crate::error::{StorageError, StorageResult};
use crate::page::{
    compute_page_checksum, decode_internal, decode_leaf, InternalEntry, LeafEntry, PageHeader,
    CHECKSUM_OFFSET,
};

/// A page read from disk with its payload decompressed.
#[derive(Debug, Clone)]
pub struct Page {
    /// Where the page was read from.
    pub addr: BlockAddr,
    /// Decoded header.
    pub header: PageHeader,
    /// Uncompressed payload.
    pub payload: Bytes,
}

impl Page {
    /// Decodes the payload as leaf entries.
    pub fn leaf_entries(&self) -> StorageResult<Vec<LeafEntry>> {
        if !self.header.page_type.is_leaf() {
            return Err(StorageError::corrupt_page(self.addr.offset, "expected a leaf page"));
        }
        decode_leaf(self.payload.clone(), self.header.entry_count, self.addr.offset)
    }

    /// Decodes the payload as internal entries.
    pub fn internal_entries(&self) -> StorageResult<Vec<InternalEntry>> {
        if self.header.page_type.is_leaf() {
            return Err(StorageError::corrupt_page(
                self.addr.offset,
                "expected an internal page",
            ));
        }
        decode_internal(self.payload.clone(), self.header.entry_count, self.addr.offset)
    }
}

/// Read-only handle on a data file.
pub struct DataFileReader {
    path: PathBuf,
    file: Mutex<File>,
    file_len: u64,
    metadata: FileMetadata,
}

impl DataFileReader {
    /// Opens a data file read-only and decodes its descriptor block.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let file_len = file.metadata()?.len();
        if !file.metadata()?.is_file() {
            return Err(StorageError::invalid_descriptor(&path, "not a regular file"));
        }

        let head_len = file_len.min(DESCRIPTOR_BLOCK_MIN_SIZE as u64) as usize;
        let mut head = vec![0u8; head_len];
        file.read_exact(&mut head)?;
        let metadata = FileMetadata::decode_descriptor(&head, &path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
            file_len,
            metadata,
        })
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file length in bytes.
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Returns the metadata decoded from the descriptor block.
    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    /// Checks that `addr` names whole allocation units inside the tree area.
    pub fn check_bounds(&self, addr: BlockAddr) -> StorageResult<()> {
        let alloc = u64::from(self.metadata.allocation_size);
        let valid = addr.offset >= alloc
            && addr.offset % alloc == 0
            && addr.size > 0
            && u64::from(addr.size) % alloc == 0
            && addr.end() <= self.file_len
            && u64::from(addr.size) >= PAGE_HEADER_SIZE as u64;
        if valid {
            Ok(())
        } else {
            Err(StorageError::AddressOutOfBounds {
                offset: addr.offset,
                size: addr.size,
                file_len: self.file_len,
                allocation_size: self.metadata.allocation_size,
            })
        }
    }

    /// Reads one page, verifying its checksum under the file's checksum
    /// mode and decompressing its payload.
    pub fn read_page(&self, addr: BlockAddr) -> StorageResult<Page> {
        self.check_bounds(addr)?;

        let mut block = vec![0u8; addr.size as usize];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(addr.offset))?;
            file.read_exact(&mut block)?;
        }

        let header = PageHeader::decode(&block, addr.offset)?;
        let used = PAGE_HEADER_SIZE + header.payload_len as usize;
        if used > block.len() {
            return Err(StorageError::corrupt_page(
                addr.offset,
                format!(
                    "payload of {} bytes overruns {} byte block",
                    header.payload_len, addr.size
                ),
            ));
        }

        let compressed = header.flags.is_compressed();
        if self.metadata.checksum_mode.covers(compressed) {
            let computed = compute_page_checksum(&block, CHECKSUM_OFFSET);
            if computed != header.checksum {
                return Err(StorageError::ChecksumMismatch {
                    offset: addr.offset,
                    stored: header.checksum,
                    computed,
                });
            }
        }

        let stored = &block[PAGE_HEADER_SIZE..used];
        let payload = if compressed {
            let compressor = self.metadata.compressor.ok_or_else(|| {
                StorageError::corrupt_page(addr.offset, "compressed page in a file without a compressor")
            })?;
            let raw = decompress(compressor, stored)
                .map_err(|e| StorageError::corrupt_page(addr.offset, e.to_string()))?;
            Bytes::from(raw)
        } else {
            Bytes::copy_from_slice(stored)
        };

        Ok(Page {
            addr,
            header,
            payload,
        })
    }

    /// Reads every leaf entry in key order.
    ///
    /// Checksums are verified on every page read. Structural checks beyond
    /// what decoding needs are left to a full verification pass.
    pub fn scan(&self) -> StorageResult<Vec<LeafEntry>> {
        let root = self.metadata.checkpoint.root;
        let mut out = Vec::with_capacity(self.metadata.checkpoint.entry_count as usize);
        if root.is_none() {
            return Ok(out);
        }

        let mut stack: Vec<(BlockAddr, Option<u8>, usize)> = vec![(root, None, 0)];
        while let Some((addr, expected_level, depth)) = stack.pop() {
            if depth > MAX_TREE_DEPTH {
                return Err(StorageError::corrupt_page(addr.offset, "tree too deep"));
            }
            let page = self.read_page(addr)?;
            if let Some(level) = expected_level {
                if page.header.level != level {
                    return Err(StorageError::corrupt_page(
                        addr.offset,
                        format!("page at level {} where {} expected", page.header.level, level),
                    ));
                }
            }
            if page.header.page_type.is_leaf() {
                out.extend(page.leaf_entries()?);
            } else {
                let child_level = page.header.level - 1;
                for child in page.internal_entries()?.into_iter().rev() {
                    stack.push((child.child, Some(child_level), depth + 1));
                }
            }
        }
        Ok(out)
    }
}

impl std::fmt::Debug for DataFileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFileReader")
            .field("path", &self.path)
            .field("file_len", &self.file_len)
            .field("file_id", &self.metadata.file_id)
            .finish()
    }
}
