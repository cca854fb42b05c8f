//! Page checksum utilities.
//!
//! Uses CRC32 (crc32fast picks a hardware-accelerated path when available).

/// Computes a CRC32 checksum for the given data.
///
/// # Example
///
/// ```rust
/// use graft_storage::page::compute_checksum;
///
/// let data = b"Hello, GraftDB!";
/// let checksum = compute_checksum(data);
/// assert_ne!(checksum, 0);
/// ```
#[inline]
pub fn compute_checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Verifies that the checksum matches the data.
///
/// # Example
///
/// ```rust
/// use graft_storage::page::{compute_checksum, verify_checksum};
///
/// let data = b"Hello, GraftDB!";
/// let checksum = compute_checksum(data);
/// assert!(verify_checksum(data, checksum));
/// assert!(!verify_checksum(data, checksum + 1));
/// ```
#[inline]
pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}

/// Computes a checksum over a block, excluding its 4-byte checksum field.
///
/// Used both for tree pages and for the descriptor block, which keep their
/// checksum at different offsets.
pub fn compute_page_checksum(block: &[u8], checksum_offset: usize) -> u32 {
    debug_assert!(checksum_offset + 4 <= block.len());

    let mut hasher = crc32fast::Hasher::new();
    if checksum_offset > 0 {
        hasher.update(&block[..checksum_offset]);
    }
    let after_checksum = checksum_offset + 4;
    if after_checksum < block.len() {
        hasher.update(&block[after_checksum..]);
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_checksum_ignores_checksum_field() {
        let mut block = vec![7u8; 512];
        let before = compute_page_checksum(&block, 20);

        block[20..24].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(compute_page_checksum(&block, 20), before);

        block[100] ^= 0xFF;
        assert_ne!(compute_page_checksum(&block, 20), before);
    }

    #[test]
    fn test_checksum_at_block_start() {
        let block = vec![1u8; 64];
        let a = compute_page_checksum(&block, 0);
        assert_eq!(a, compute_checksum(&block[4..]));
    }
}
