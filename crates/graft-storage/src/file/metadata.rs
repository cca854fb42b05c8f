//! File metadata and the descriptor block.
//!
//! The first allocation unit of every data file is the descriptor block.
//! Its first 512 bytes hold the physical metadata needed to read the file
//! without any outside catalog; the rest of the unit is zero padding.
//!
//! # Descriptor Layout
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//!   0       8   magic ("GRFTDATA")
//!   8       4   format_version
//!  12       4   checksum (CRC32 of bytes 0..512, excluding this field)
//!  16       8   file_id
//!  24       4   allocation_size
//!  28       1   checksum_mode
//!  29       1   compressor (0 none, 1 snappy, 2 zlib)
//!  30       1   log_enabled
//!  31       1   reserved
//!  32       4   internal_page_max
//!  36       4   leaf_page_max
//!  40       4   leaf_key_max
//!  44       4   leaf_value_max
//!  48       8   checkpoint generation
//!  56       8   root offset
//!  64       4   root size
//!  68       4   reserved
//!  72       8   entry_count
//!  80       8   newest_timestamp
//!  88       8   file_size
//!  96       2   key_format length, then key_format bytes
//!   .       2   value_format length, then value_format bytes
//! ```

use std::fmt;
use std::path::Path;

use bytes::{Buf, BufMut};

use graft_common::constants::{
    DATA_FILE_FORMAT_VERSION, DATA_FILE_MAGIC, DEFAULT_ALLOCATION_SIZE,
    DEFAULT_INTERNAL_PAGE_MAX, DEFAULT_LEAF_KEY_MAX, DEFAULT_LEAF_PAGE_MAX,
    DEFAULT_LEAF_VALUE_MAX, DESCRIPTOR_BLOCK_MIN_SIZE, MAX_ALLOCATION_SIZE, MAX_PAGE_SIZE,
    MIN_ALLOCATION_SIZE, MIN_SUPPORTED_FORMAT_VERSION,
};
use graft_common::types::{FileId, Timestamp};

use crate::error::{StorageError, StorageResult};
use crate::page::compute_page_checksum;

/// Offset of the checksum field in the descriptor block.
pub const DESCRIPTOR_CHECKSUM_OFFSET: usize = 12;

/// Longest key or value format string the descriptor can hold.
pub const MAX_FORMAT_LEN: usize = 128;

// =============================================================================
// Checksum Mode
// =============================================================================

/// Which pages carry a checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChecksumMode {
    /// No page checksums.
    None = 0,
    /// Only pages stored uncompressed carry checksums.
    Uncompressed = 1,
    /// Every page carries a checksum.
    Full = 2,
}

impl ChecksumMode {
    /// Creates a mode from its on-disk byte.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Uncompressed),
            2 => Some(Self::Full),
            _ => None,
        }
    }

    /// Parses a configuration name ("none", "uncompressed", "full").
    ///
    /// "on" and "off" are accepted as aliases for "full" and "none".
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" | "off" => Some(Self::None),
            "uncompressed" => Some(Self::Uncompressed),
            "full" | "on" => Some(Self::Full),
            _ => None,
        }
    }

    /// Configuration name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Uncompressed => "uncompressed",
            Self::Full => "full",
        }
    }

    /// Returns true if a page stored with the given compression state
    /// carries a checksum under this mode.
    #[inline]
    pub const fn covers(self, compressed: bool) -> bool {
        match self {
            Self::None => false,
            Self::Uncompressed => !compressed,
            Self::Full => true,
        }
    }
}

impl fmt::Display for ChecksumMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Compressor
// =============================================================================

/// Block compressor applied to page payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Compressor {
    /// Snappy raw block format.
    Snappy = 1,
    /// zlib stream.
    Zlib = 2,
}

impl Compressor {
    /// Decodes the on-disk byte. 0 means no compressor.
    pub const fn from_u8(value: u8) -> Option<Option<Self>> {
        match value {
            0 => Some(None),
            1 => Some(Some(Self::Snappy)),
            2 => Some(Some(Self::Zlib)),
            _ => None,
        }
    }

    /// Parses a configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "snappy" => Some(Self::Snappy),
            "zlib" => Some(Self::Zlib),
            _ => None,
        }
    }

    /// Configuration name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Snappy => "snappy",
            Self::Zlib => "zlib",
        }
    }
}

impl fmt::Display for Compressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Page Sizing
// =============================================================================

/// Page size limits recorded in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSizing {
    /// Maximum internal page size.
    pub internal_max: u32,
    /// Maximum leaf page size.
    pub leaf_max: u32,
    /// Maximum leaf key size, 0 for unlimited.
    pub leaf_key_max: u32,
    /// Maximum leaf value size, 0 for unlimited.
    pub leaf_value_max: u32,
}

impl Default for PageSizing {
    fn default() -> Self {
        Self {
            internal_max: DEFAULT_INTERNAL_PAGE_MAX,
            leaf_max: DEFAULT_LEAF_PAGE_MAX,
            leaf_key_max: DEFAULT_LEAF_KEY_MAX,
            leaf_value_max: DEFAULT_LEAF_VALUE_MAX,
        }
    }
}

impl PageSizing {
    /// Key size limit, `None` when unlimited.
    #[inline]
    pub fn key_limit(&self) -> Option<usize> {
        (self.leaf_key_max != 0).then_some(self.leaf_key_max as usize)
    }

    /// Value size limit, `None` when unlimited.
    #[inline]
    pub fn value_limit(&self) -> Option<usize> {
        (self.leaf_value_max != 0).then_some(self.leaf_value_max as usize)
    }
}

// =============================================================================
// Block Address and Checkpoint Record
// =============================================================================

/// Location of a page in a data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockAddr {
    /// Byte offset from the start of the file.
    pub offset: u64,
    /// Size in bytes, a multiple of the allocation size.
    pub size: u32,
}

impl BlockAddr {
    /// Address of an empty tree.
    pub const NONE: Self = Self { offset: 0, size: 0 };

    /// Creates an address.
    #[inline]
    #[must_use]
    pub const fn new(offset: u64, size: u32) -> Self {
        Self { offset, size }
    }

    /// Returns true for the empty-tree address.
    #[inline]
    #[must_use]
    pub const fn is_none(&self) -> bool {
        self.offset == 0 && self.size == 0
    }

    /// End offset (exclusive).
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.offset.saturating_add(self.size as u64)
    }
}

impl fmt::Display for BlockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}+{}]", self.offset, self.size)
    }
}

/// The checkpoint a data file image was written by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckpointRecord {
    /// Checkpoint generation, 0 for a freshly created empty file.
    pub generation: u64,
    /// Root page address.
    pub root: BlockAddr,
    /// Number of leaf entries (distinct keys) in the tree.
    pub entry_count: u64,
    /// Newest commit timestamp stored in the tree.
    pub newest_timestamp: Timestamp,
    /// Length of the image in bytes.
    pub file_size: u64,
}

// =============================================================================
// File Metadata
// =============================================================================

/// Physical metadata embedded in a data file.
///
/// Derived solely from the file's own descriptor block; the destination
/// catalog never contributes to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// Identifier the file was written with.
    pub file_id: FileId,
    /// Allocation unit in bytes.
    pub allocation_size: u32,
    /// Page checksum mode.
    pub checksum_mode: ChecksumMode,
    /// Block compressor, if any.
    pub compressor: Option<Compressor>,
    /// Page size limits.
    pub page_sizing: PageSizing,
    /// Format version the file was written with.
    pub format_version: u32,
    /// Whether the table was logged.
    pub is_log_enabled: bool,
    /// Physical key representation.
    pub key_format: String,
    /// Physical value representation.
    pub value_format: String,
    /// Checkpoint that wrote this image.
    pub checkpoint: CheckpointRecord,
}

impl FileMetadata {
    /// Creates metadata with default physical settings and raw byte formats.
    pub fn new(file_id: FileId) -> Self {
        Self {
            file_id,
            allocation_size: DEFAULT_ALLOCATION_SIZE,
            checksum_mode: ChecksumMode::Uncompressed,
            compressor: None,
            page_sizing: PageSizing::default(),
            format_version: DATA_FILE_FORMAT_VERSION,
            is_log_enabled: false,
            key_format: "u".to_string(),
            value_format: "u".to_string(),
            checkpoint: CheckpointRecord::default(),
        }
    }

    /// Sets the allocation size.
    #[must_use]
    pub fn with_allocation_size(mut self, allocation_size: u32) -> Self {
        self.allocation_size = allocation_size;
        self
    }

    /// Sets the checksum mode.
    #[must_use]
    pub fn with_checksum_mode(mut self, mode: ChecksumMode) -> Self {
        self.checksum_mode = mode;
        self
    }

    /// Sets the block compressor.
    #[must_use]
    pub fn with_compressor(mut self, compressor: Option<Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    /// Sets the page sizing.
    #[must_use]
    pub fn with_page_sizing(mut self, sizing: PageSizing) -> Self {
        self.page_sizing = sizing;
        self
    }

    /// Sets whether the table is logged.
    #[must_use]
    pub fn with_log_enabled(mut self, enabled: bool) -> Self {
        self.is_log_enabled = enabled;
        self
    }

    /// Sets the key and value formats.
    #[must_use]
    pub fn with_formats(mut self, key_format: impl Into<String>, value_format: impl Into<String>) -> Self {
        self.key_format = key_format.into();
        self.value_format = value_format.into();
        self
    }

    /// Checks that the physical settings describe a writable file.
    pub fn validate(&self) -> StorageResult<()> {
        if !self.allocation_size.is_power_of_two()
            || !(MIN_ALLOCATION_SIZE..=MAX_ALLOCATION_SIZE).contains(&self.allocation_size)
        {
            return Err(StorageError::invalid_metadata(
                "allocation_size",
                format!(
                    "{} is not a power of two between {} and {}",
                    self.allocation_size, MIN_ALLOCATION_SIZE, MAX_ALLOCATION_SIZE
                ),
            ));
        }
        for (field, value) in [
            ("internal_page_max", self.page_sizing.internal_max),
            ("leaf_page_max", self.page_sizing.leaf_max),
        ] {
            if value < self.allocation_size || value > MAX_PAGE_SIZE {
                return Err(StorageError::invalid_metadata(
                    field,
                    format!(
                        "{} must lie between the allocation size {} and {}",
                        value, self.allocation_size, MAX_PAGE_SIZE
                    ),
                ));
            }
        }
        for (field, format) in [("key_format", &self.key_format), ("value_format", &self.value_format)] {
            if format.is_empty() || format.len() > MAX_FORMAT_LEN {
                return Err(StorageError::invalid_metadata(
                    field,
                    format!("length {} outside 1..={}", format.len(), MAX_FORMAT_LEN),
                ));
            }
        }
        Ok(())
    }

    /// Encodes the descriptor block (one allocation unit, checksummed).
    pub fn encode_descriptor(&self) -> Vec<u8> {
        let block_len = (self.allocation_size as usize).max(DESCRIPTOR_BLOCK_MIN_SIZE);
        let mut block = vec![0u8; block_len];
        {
            let mut buf = &mut block[..DESCRIPTOR_BLOCK_MIN_SIZE];
            buf.put_slice(&DATA_FILE_MAGIC);
            buf.put_u32_le(self.format_version);
            buf.put_u32_le(0);
            buf.put_u64_le(self.file_id.as_u64());
            buf.put_u32_le(self.allocation_size);
            buf.put_u8(self.checksum_mode as u8);
            buf.put_u8(self.compressor.map_or(0, |c| c as u8));
            buf.put_u8(u8::from(self.is_log_enabled));
            buf.put_u8(0);
            buf.put_u32_le(self.page_sizing.internal_max);
            buf.put_u32_le(self.page_sizing.leaf_max);
            buf.put_u32_le(self.page_sizing.leaf_key_max);
            buf.put_u32_le(self.page_sizing.leaf_value_max);
            buf.put_u64_le(self.checkpoint.generation);
            buf.put_u64_le(self.checkpoint.root.offset);
            buf.put_u32_le(self.checkpoint.root.size);
            buf.put_u32_le(0);
            buf.put_u64_le(self.checkpoint.entry_count);
            buf.put_u64_le(self.checkpoint.newest_timestamp.as_u64());
            buf.put_u64_le(self.checkpoint.file_size);
            buf.put_u16_le(self.key_format.len() as u16);
            buf.put_slice(self.key_format.as_bytes());
            buf.put_u16_le(self.value_format.len() as u16);
            buf.put_slice(self.value_format.as_bytes());
        }
        let checksum =
            compute_page_checksum(&block[..DESCRIPTOR_BLOCK_MIN_SIZE], DESCRIPTOR_CHECKSUM_OFFSET);
        block[DESCRIPTOR_CHECKSUM_OFFSET..DESCRIPTOR_CHECKSUM_OFFSET + 4]
            .copy_from_slice(&checksum.to_le_bytes());
        block
    }

    /// Decodes the descriptor block read from `path`.
    ///
    /// `block` must hold at least the first 512 bytes of the file.
    pub fn decode_descriptor(block: &[u8], path: &Path) -> StorageResult<Self> {
        let invalid = |reason: String| StorageError::invalid_descriptor(path, reason);

        if block.len() < DESCRIPTOR_BLOCK_MIN_SIZE {
            return Err(invalid(format!(
                "file holds {} bytes, descriptor needs {}",
                block.len(),
                DESCRIPTOR_BLOCK_MIN_SIZE
            )));
        }
        let block = &block[..DESCRIPTOR_BLOCK_MIN_SIZE];
        let mut buf = block;

        let mut magic = [0u8; 8];
        buf.copy_to_slice(&mut magic);
        if magic != DATA_FILE_MAGIC {
            return Err(invalid("bad magic, not a data file".to_string()));
        }

        let format_version = buf.get_u32_le();
        if !(MIN_SUPPORTED_FORMAT_VERSION..=DATA_FILE_FORMAT_VERSION).contains(&format_version) {
            return Err(StorageError::UnsupportedVersion {
                path: path.to_path_buf(),
                found: format_version,
                min: MIN_SUPPORTED_FORMAT_VERSION,
                max: DATA_FILE_FORMAT_VERSION,
            });
        }

        let stored = buf.get_u32_le();
        let computed = compute_page_checksum(block, DESCRIPTOR_CHECKSUM_OFFSET);
        if stored != computed {
            return Err(invalid(format!(
                "descriptor checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored, computed
            )));
        }

        let file_id = FileId::new(buf.get_u64_le());
        let allocation_size = buf.get_u32_le();
        let checksum_mode = ChecksumMode::from_u8(buf.get_u8())
            .ok_or_else(|| invalid("unknown checksum mode".to_string()))?;
        let compressor = Compressor::from_u8(buf.get_u8())
            .ok_or_else(|| invalid("unknown block compressor".to_string()))?;
        let is_log_enabled = match buf.get_u8() {
            0 => false,
            1 => true,
            other => return Err(invalid(format!("bad log flag {}", other))),
        };
        let _reserved = buf.get_u8();
        let page_sizing = PageSizing {
            internal_max: buf.get_u32_le(),
            leaf_max: buf.get_u32_le(),
            leaf_key_max: buf.get_u32_le(),
            leaf_value_max: buf.get_u32_le(),
        };
        let generation = buf.get_u64_le();
        let root = BlockAddr::new(buf.get_u64_le(), buf.get_u32_le());
        let _reserved = buf.get_u32_le();
        let entry_count = buf.get_u64_le();
        let newest_timestamp = Timestamp::new(buf.get_u64_le());
        let file_size = buf.get_u64_le();
        let key_format = read_format(&mut buf).map_err(|r| invalid(format!("key_format: {}", r)))?;
        let value_format =
            read_format(&mut buf).map_err(|r| invalid(format!("value_format: {}", r)))?;

        let metadata = Self {
            file_id,
            allocation_size,
            checksum_mode,
            compressor,
            page_sizing,
            format_version,
            is_log_enabled,
            key_format,
            value_format,
            checkpoint: CheckpointRecord {
                generation,
                root,
                entry_count,
                newest_timestamp,
                file_size,
            },
        };
        metadata.validate().map_err(|e| invalid(e.to_string()))?;
        Ok(metadata)
    }
}

fn read_format(buf: &mut &[u8]) -> Result<String, String> {
    if buf.remaining() < 2 {
        return Err("truncated length".to_string());
    }
    let len = buf.get_u16_le() as usize;
    if len > MAX_FORMAT_LEN || buf.remaining() < len {
        return Err(format!("bad length {}", len));
    }
    let raw = buf[..len].to_vec();
    buf.advance(len);
    String::from_utf8(raw).map_err(|_| "not UTF-8".to_string())
}
