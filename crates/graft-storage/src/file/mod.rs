//! Data file I/O.
//!
//! - [`FileMetadata`]: physical settings and checkpoint record embedded in
//!   the descriptor block
//! - [`DataFileWriter`]: writes a complete tree image from sorted entries
//! - [`DataFileReader`]: read-only access for probing, verification and
//!   loading

mod compress;
mod metadata;
mod reader;
mod writer;

pub use compress::{compress, decompress};
pub use metadata::{
    BlockAddr, CheckpointRecord, ChecksumMode, Compressor, FileMetadata, PageSizing,
    DESCRIPTOR_CHECKSUM_OFFSET, MAX_FORMAT_LEN,
};
pub use reader::{DataFileReader, Page};
pub use writer::{DataFileWriter, WriteSummary};
