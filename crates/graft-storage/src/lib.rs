//! # graft-storage
//!
//! On-disk data file format for GraftDB.
//!
//! A data file is a self-describing image of one table: a descriptor block
//! carrying the file's physical metadata and checkpoint record, followed by
//! the pages of a B-tree written at the last checkpoint.
//!
//! ```text
//! ┌──────────────────────┐ offset 0
//! │ Descriptor block     │ one allocation unit
//! ├──────────────────────┤ allocation_size
//! │ Leaf page            │
//! ├──────────────────────┤
//! │ Leaf page            │
//! ├──────────────────────┤
//! │ ...                  │
//! ├──────────────────────┤
//! │ Internal page (root) │
//! └──────────────────────┘
//! ```
//!
//! - [`page`]: page header, checksums, leaf/internal payload codec
//! - [`file`]: file metadata, block compression, writer and reader

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod file;
pub mod page;

pub use error::{StorageError, StorageResult};
pub use file::{
    BlockAddr, CheckpointRecord, ChecksumMode, Compressor, DataFileReader, DataFileWriter,
    FileMetadata, Page, PageSizing, WriteSummary,
};
pub use page::{
    InternalEntry, LeafEntry, PageHeader, PageType, VersionRecord, MAX_VERSIONS_PER_ENTRY,
};
