//! Page header format.
//!
//! Every tree page starts with a 32-byte header.
//!
//! # Header Layout (32 bytes)
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//!   0       2   magic (0x4746 = "GF")
//!   2       1   page_type
//!   3       1   level (0 for leaves)
//!   4       8   page_id
//!  12       8   write_gen (checkpoint generation that wrote the page)
//!  20       4   checksum (CRC32 of the block, excluding this field)
//!  24       2   flags
//!  26       2   entry_count
//!  28       4   payload_len (bytes after the header, as stored)
//! ```

use bytes::{Buf, BufMut};

use graft_common::types::PageId;

use super::types::{PageFlags, PageType};
use super::{PAGE_HEADER_SIZE, PAGE_MAGIC};
use crate::error::{StorageError, StorageResult};

/// Offset of the checksum field in the header.
pub const CHECKSUM_OFFSET: usize = 20;

/// Decoded page header.
///
/// # Example
///
/// ```rust
/// use graft_storage::page::{PageHeader, PageType, PAGE_HEADER_SIZE};
/// use graft_common::types::PageId;
///
/// let header = PageHeader::new(PageType::Leaf, 0, PageId::new(1), 3);
/// let mut buf = vec![0u8; PAGE_HEADER_SIZE];
/// header.encode(&mut buf[..]);
///
/// let decoded = PageHeader::decode(&buf, 4096).unwrap();
/// assert_eq!(decoded.page_id, PageId::new(1));
/// assert_eq!(decoded.write_gen, 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    /// Page type.
    pub page_type: PageType,
    /// Tree level, 0 for leaves.
    pub level: u8,
    /// Ordinal of the page within the file image.
    pub page_id: PageId,
    /// Checkpoint generation that wrote the page.
    pub write_gen: u64,
    /// Stored checksum (0 when the checksum mode leaves the page unchecked).
    pub checksum: u32,
    /// Page flags.
    pub flags: PageFlags,
    /// Number of entries in the payload.
    pub entry_count: u16,
    /// Stored payload length in bytes.
    pub payload_len: u32,
}

impl PageHeader {
    /// Creates a header with no payload.
    pub fn new(page_type: PageType, level: u8, page_id: PageId, write_gen: u64) -> Self {
        Self {
            page_type,
            level,
            page_id,
            write_gen,
            checksum: 0,
            flags: PageFlags::empty(),
            entry_count: 0,
            payload_len: 0,
        }
    }

    /// Writes the header into the first 32 bytes of `buf`.
    pub fn encode(&self, mut buf: &mut [u8]) {
        buf.put_u16_le(PAGE_MAGIC);
        buf.put_u8(self.page_type as u8);
        buf.put_u8(self.level);
        buf.put_u64_le(self.page_id.as_u64());
        buf.put_u64_le(self.write_gen);
        buf.put_u32_le(self.checksum);
        buf.put_u16_le(self.flags.bits());
        buf.put_u16_le(self.entry_count);
        buf.put_u32_le(self.payload_len);
    }

    /// Decodes a header from the start of a page read at `offset`.
    pub fn decode(mut buf: &[u8], offset: u64) -> StorageResult<Self> {
        if buf.len() < PAGE_HEADER_SIZE {
            return Err(StorageError::corrupt_page(
                offset,
                format!("page shorter than header: {} bytes", buf.len()),
            ));
        }

        let magic = buf.get_u16_le();
        if magic != PAGE_MAGIC {
            return Err(StorageError::corrupt_page(
                offset,
                format!("bad page magic {:#06x}", magic),
            ));
        }
        let raw_type = buf.get_u8();
        let page_type = PageType::from_u8(raw_type).ok_or_else(|| {
            StorageError::corrupt_page(offset, format!("unknown page type {}", raw_type))
        })?;
        let level = buf.get_u8();
        let page_id = PageId::new(buf.get_u64_le());
        let write_gen = buf.get_u64_le();
        let checksum = buf.get_u32_le();
        let flags = PageFlags::from_bits(buf.get_u16_le());
        let entry_count = buf.get_u16_le();
        let payload_len = buf.get_u32_le();

        if flags.has_unknown_bits() {
            return Err(StorageError::corrupt_page(
                offset,
                format!("unknown page flags {:#06x}", flags.bits()),
            ));
        }
        if page_type.is_leaf() != (level == 0) {
            return Err(StorageError::corrupt_page(
                offset,
                format!("{} page at level {}", page_type, level),
            ));
        }

        Ok(Self {
            page_type,
            level,
            page_id,
            write_gen,
            checksum,
            flags,
            entry_count,
            payload_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let mut header = PageHeader::new(PageType::Internal, 2, PageId::new(17), 9);
        header.checksum = 0xABCD_1234;
        header.flags.set(PageFlags::HAS_TOMBSTONES);
        header.entry_count = 12;
        header.payload_len = 300;

        let mut buf = [0u8; PAGE_HEADER_SIZE];
        header.encode(&mut buf[..]);
        assert_eq!(&buf[0..2], &PAGE_MAGIC.to_le_bytes());
        assert_eq!(
            u32::from_le_bytes(buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].try_into().unwrap()),
            0xABCD_1234
        );

        assert_eq!(PageHeader::decode(&buf, 0).unwrap(), header);
    }

    #[test]
    fn test_bad_magic() {
        let buf = [0u8; PAGE_HEADER_SIZE];
        let err = PageHeader::decode(&buf, 8192).unwrap_err();
        assert_eq!(err.page_offset(), Some(8192));
    }

    #[test]
    fn test_level_must_match_type() {
        let header = PageHeader::new(PageType::Leaf, 1, PageId::new(1), 1);
        let mut buf = [0u8; PAGE_HEADER_SIZE];
        header.encode(&mut buf[..]);
        assert!(PageHeader::decode(&buf, 0).is_err());
    }
}
