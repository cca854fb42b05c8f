//! Leaf and internal payload codec.
//!
//! # Leaf entry
//!
//! ```text
//! u32 key_len | key | u16 version_count | version*
//! version: u64 start_ts | u64 stop_ts | u8 kind (0 value, 1 tombstone) | u32 value_len | value
//! ```
//!
//! # Internal entry
//!
//! ```text
//! u32 key_len | first_key | u64 child_offset | u32 child_size
//! ```
//!
//! Versions within an entry are stored oldest first.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use graft_common::types::Timestamp;

use crate::error::{StorageError, StorageResult};
use crate::file::BlockAddr;

const VERSION_KIND_VALUE: u8 = 0;
const VERSION_KIND_TOMBSTONE: u8 = 1;

/// Fixed bytes of one encoded version, excluding the value.
const VERSION_OVERHEAD: usize = 8 + 8 + 1 + 4;

/// One timestamped version of a row as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    /// Commit timestamp that made the version visible.
    pub start_ts: Timestamp,
    /// Commit timestamp that superseded it (`MAX` if current).
    pub stop_ts: Timestamp,
    /// Row value, or `None` for a tombstone.
    pub value: Option<Bytes>,
}

impl VersionRecord {
    /// Creates a value version.
    pub fn value(start_ts: Timestamp, stop_ts: Timestamp, value: impl Into<Bytes>) -> Self {
        Self {
            start_ts,
            stop_ts,
            value: Some(value.into()),
        }
    }

    /// Creates a tombstone version.
    pub fn tombstone(start_ts: Timestamp, stop_ts: Timestamp) -> Self {
        Self {
            start_ts,
            stop_ts,
            value: None,
        }
    }

    /// Returns true for tombstones.
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Length of the value in bytes (0 for tombstones).
    #[inline]
    pub fn value_len(&self) -> usize {
        self.value.as_ref().map_or(0, Bytes::len)
    }
}

/// A row key and its full version history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEntry {
    /// Row key.
    pub key: Bytes,
    /// Versions, oldest first.
    pub versions: Vec<VersionRecord>,
}

impl LeafEntry {
    /// Creates a leaf entry.
    pub fn new(key: impl Into<Bytes>, versions: Vec<VersionRecord>) -> Self {
        Self {
            key: key.into(),
            versions,
        }
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        4 + self.key.len()
            + 2
            + self
                .versions
                .iter()
                .map(|v| VERSION_OVERHEAD + v.value_len())
                .sum::<usize>()
    }

    /// Newest timestamp mentioned by any version.
    pub fn newest_timestamp(&self) -> Timestamp {
        self.versions
            .iter()
            .map(|v| {
                if v.stop_ts.is_max() {
                    v.start_ts
                } else {
                    v.start_ts.max(v.stop_ts)
                }
            })
            .max()
            .unwrap_or(Timestamp::ZERO)
    }

    /// Returns true if any version is a tombstone.
    pub fn has_tombstone(&self) -> bool {
        self.versions.iter().any(VersionRecord::is_tombstone)
    }
}

/// An internal page slot: the first key reachable through a child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalEntry {
    /// Smallest key in the child subtree.
    pub first_key: Bytes,
    /// Address of the child page.
    pub child: BlockAddr,
}

impl InternalEntry {
    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        4 + self.first_key.len() + 8 + 4
    }
}

/// Most versions a single leaf entry can hold on disk.
pub const MAX_VERSIONS_PER_ENTRY: usize = u16::MAX as usize;

fn length_u32(field: &'static str, len: usize) -> StorageResult<u32> {
    u32::try_from(len).map_err(|_| {
        StorageError::invalid_metadata(field, format!("{} bytes exceeds the u32 length field", len))
    })
}

/// Appends leaf entries to `buf`.
///
/// Fails without writing the offending entry if a key, a value or the
/// version count does not fit its length field.
pub fn encode_leaf(entries: &[LeafEntry], buf: &mut BytesMut) -> StorageResult<()> {
    for entry in entries {
        let key_len = length_u32("key", entry.key.len())?;
        let version_count = u16::try_from(entry.versions.len()).map_err(|_| {
            StorageError::invalid_metadata(
                "versions",
                format!(
                    "{} versions exceeds the limit of {} per key",
                    entry.versions.len(),
                    MAX_VERSIONS_PER_ENTRY
                ),
            )
        })?;
        buf.put_u32_le(key_len);
        buf.put_slice(&entry.key);
        buf.put_u16_le(version_count);
        for version in &entry.versions {
            buf.put_u64_le(version.start_ts.as_u64());
            buf.put_u64_le(version.stop_ts.as_u64());
            match &version.value {
                Some(value) => {
                    buf.put_u8(VERSION_KIND_VALUE);
                    buf.put_u32_le(length_u32("value", value.len())?);
                    buf.put_slice(value);
                }
                None => {
                    buf.put_u8(VERSION_KIND_TOMBSTONE);
                    buf.put_u32_le(0);
                }
            }
        }
    }
    Ok(())
}

/// Appends internal entries to `buf`.
pub fn encode_internal(entries: &[InternalEntry], buf: &mut BytesMut) -> StorageResult<()> {
    for entry in entries {
        buf.put_u32_le(length_u32("key", entry.first_key.len())?);
        buf.put_slice(&entry.first_key);
        buf.put_u64_le(entry.child.offset);
        buf.put_u32_le(entry.child.size);
    }
    Ok(())
}

/// Decodes `count` leaf entries from a page payload read at `offset`.
pub fn decode_leaf(payload: Bytes, count: u16, offset: u64) -> StorageResult<Vec<LeafEntry>> {
    let mut reader = PayloadReader::new(payload, offset);
    let mut entries = Vec::with_capacity(count as usize);

    for _ in 0..count {
        let key = reader.bytes_u32()?;
        let version_count = reader.u16()?;
        if version_count == 0 {
            return Err(reader.corrupt("leaf entry without versions"));
        }
        let mut versions = Vec::with_capacity(version_count as usize);
        for _ in 0..version_count {
            let start_ts = Timestamp::new(reader.u64()?);
            let stop_ts = Timestamp::new(reader.u64()?);
            let kind = reader.u8()?;
            let value = reader.bytes_u32()?;
            let value = match kind {
                VERSION_KIND_VALUE => Some(value),
                VERSION_KIND_TOMBSTONE if value.is_empty() => None,
                VERSION_KIND_TOMBSTONE => {
                    return Err(reader.corrupt("tombstone carries a value"));
                }
                other => return Err(reader.corrupt(format!("unknown version kind {}", other))),
            };
            if stop_ts < start_ts {
                return Err(reader.corrupt(format!(
                    "version stops at {} before it starts at {}",
                    stop_ts, start_ts
                )));
            }
            versions.push(VersionRecord {
                start_ts,
                stop_ts,
                value,
            });
        }
        entries.push(LeafEntry { key, versions });
    }

    reader.finish()?;
    Ok(entries)
}

/// Decodes `count` internal entries from a page payload read at `offset`.
pub fn decode_internal(
    payload: Bytes,
    count: u16,
    offset: u64,
) -> StorageResult<Vec<InternalEntry>> {
    let mut reader = PayloadReader::new(payload, offset);
    let mut entries = Vec::with_capacity(count as usize);

    for _ in 0..count {
        let first_key = reader.bytes_u32()?;
        let child = BlockAddr::new(reader.u64()?, reader.u32()?);
        entries.push(InternalEntry { first_key, child });
    }

    reader.finish()?;
    Ok(entries)
}

/// Bounds-checked cursor over a page payload.
struct PayloadReader {
    buf: Bytes,
    offset: u64,
}

impl PayloadReader {
    fn new(buf: Bytes, offset: u64) -> Self {
        Self { buf, offset }
    }

    fn corrupt(&self, reason: impl Into<String>) -> StorageError {
        StorageError::corrupt_page(self.offset, reason)
    }

    fn need(&self, n: usize) -> StorageResult<()> {
        if self.buf.remaining() < n {
            return Err(self.corrupt(format!(
                "payload truncated: need {} bytes, {} left",
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn u8(&mut self) -> StorageResult<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self) -> StorageResult<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    fn u32(&mut self) -> StorageResult<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    fn u64(&mut self) -> StorageResult<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    fn bytes_u32(&mut self) -> StorageResult<Bytes> {
        let len = self.u32()? as usize;
        self.need(len)?;
        Ok(self.buf.split_to(len))
    }

    fn finish(self) -> StorageResult<()> {
        if self.buf.has_remaining() {
            return Err(self.corrupt(format!(
                "{} trailing bytes after last entry",
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(v: u64) -> Timestamp {
        Timestamp::new(v)
    }

    #[test]
    fn test_leaf_roundtrip_with_history() {
        let entries = vec![
            LeafEntry::new(
                &b"1"[..],
                vec![
                    VersionRecord::value(ts(10), ts(30), &b"A"[..]),
                    VersionRecord::value(ts(30), Timestamp::MAX, &b"A2"[..]),
                ],
            ),
            LeafEntry::new(
                &b"2"[..],
                vec![
                    VersionRecord::value(ts(20), ts(25), &b"B"[..]),
                    VersionRecord::tombstone(ts(25), Timestamp::MAX),
                ],
            ),
        ];

        let mut buf = BytesMut::new();
        encode_leaf(&entries, &mut buf).unwrap();
        assert_eq!(
            buf.len(),
            entries.iter().map(LeafEntry::encoded_len).sum::<usize>()
        );

        let decoded = decode_leaf(buf.freeze(), 2, 4096).unwrap();
        assert_eq!(decoded, entries);
        assert!(decoded[1].has_tombstone());
        assert_eq!(decoded[0].newest_timestamp(), ts(30));
    }

    #[test]
    fn test_truncated_leaf_reports_offset() {
        let entries = vec![LeafEntry::new(
            &b"key"[..],
            vec![VersionRecord::value(ts(1), Timestamp::MAX, &b"value"[..])],
        )];
        let mut buf = BytesMut::new();
        encode_leaf(&entries, &mut buf).unwrap();
        buf.truncate(buf.len() - 2);

        let err = decode_leaf(buf.freeze(), 1, 12288).unwrap_err();
        assert_eq!(err.page_offset(), Some(12288));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let entries = vec![InternalEntry {
            first_key: Bytes::from_static(b"a"),
            child: BlockAddr::new(4096, 4096),
        }];
        let mut buf = BytesMut::new();
        encode_internal(&entries, &mut buf).unwrap();
        buf.put_u8(0);

        assert!(decode_internal(buf.freeze(), 1, 0).is_err());
    }

    #[test]
    fn test_internal_roundtrip() {
        let entries = vec![
            InternalEntry {
                first_key: Bytes::from_static(b"a"),
                child: BlockAddr::new(512, 512),
            },
            InternalEntry {
                first_key: Bytes::from_static(b"m"),
                child: BlockAddr::new(1024, 1536),
            },
        ];
        let mut buf = BytesMut::new();
        encode_internal(&entries, &mut buf).unwrap();
        assert_eq!(decode_internal(buf.freeze(), 2, 0).unwrap(), entries);
    }

    #[test]
    fn test_version_count_overflow_rejected() {
        let versions = (0..=MAX_VERSIONS_PER_ENTRY as u64)
            .map(|i| VersionRecord::value(ts(i + 1), ts(i + 2), &b"v"[..]))
            .collect();
        let entries = vec![LeafEntry::new(&b"k"[..], versions)];

        let mut buf = BytesMut::new();
        let err = encode_leaf(&entries, &mut buf).unwrap_err();
        assert!(matches!(err, StorageError::InvalidMetadata { field: "versions", .. }));
        assert!(buf.is_empty());
    }
}
