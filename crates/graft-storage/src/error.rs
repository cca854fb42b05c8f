//! Storage error types.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use graft_common::ErrorCode;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the data file layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error from the underlying system.
    #[error("storage I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: io::Error,
    },

    /// The descriptor block could not be decoded.
    #[error("invalid data file {path}: {reason}")]
    InvalidDescriptor {
        /// File being opened.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The file was written by an unsupported format version.
    #[error("unsupported data file version {found} in {path} (supported {min}..={max})")]
    UnsupportedVersion {
        /// File being opened.
        path: PathBuf,
        /// Version found in the file.
        found: u32,
        /// Oldest supported version.
        min: u32,
        /// Newest supported version.
        max: u32,
    },

    /// A page checksum did not match.
    #[error("checksum mismatch in page at offset {offset}: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Page offset.
        offset: u64,
        /// Checksum stored in the page header.
        stored: u32,
        /// Checksum computed from the page bytes.
        computed: u32,
    },

    /// A block address does not resolve inside the file.
    #[error("block address {offset}+{size} outside file bounds (length {file_len}, allocation size {allocation_size})")]
    AddressOutOfBounds {
        /// Requested offset.
        offset: u64,
        /// Requested size.
        size: u32,
        /// Current file length.
        file_len: u64,
        /// File allocation unit.
        allocation_size: u32,
    },

    /// A page failed to decode.
    #[error("corrupt page at offset {offset}: {reason}")]
    CorruptPage {
        /// Page offset.
        offset: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// Block compression or decompression failed.
    #[error("{compressor} block compression failed: {reason}")]
    Compression {
        /// Compressor name.
        compressor: &'static str,
        /// Underlying failure.
        reason: String,
    },

    /// A file that must not exist already does.
    #[error("data file already exists: {path}")]
    FileExists {
        /// Existing file.
        path: PathBuf,
    },

    /// Metadata handed to the writer is unusable.
    #[error("invalid file metadata '{field}': {reason}")]
    InvalidMetadata {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl StorageError {
    /// Creates a corrupt page error.
    pub fn corrupt_page(offset: u64, reason: impl Into<String>) -> Self {
        Self::CorruptPage {
            offset,
            reason: reason.into(),
        }
    }

    /// Creates an invalid descriptor error.
    pub fn invalid_descriptor(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid metadata error.
    pub fn invalid_metadata(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            field,
            reason: reason.into(),
        }
    }

    /// Returns true if the error concerns the descriptor block rather than
    /// the page tree.
    pub fn is_descriptor_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidDescriptor { .. } | Self::UnsupportedVersion { .. }
        )
    }

    /// Returns the page offset the error refers to, if any.
    pub fn page_offset(&self) -> Option<u64> {
        match self {
            Self::ChecksumMismatch { offset, .. }
            | Self::AddressOutOfBounds { offset, .. }
            | Self::CorruptPage { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    /// Maps the error onto the shared error code vocabulary.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Io { source } if source.kind() == io::ErrorKind::NotFound => {
                ErrorCode::FileNotFound
            }
            Self::Io { .. } => ErrorCode::Io,
            Self::InvalidDescriptor { .. } | Self::UnsupportedVersion { .. } => {
                ErrorCode::NotAValidDataFile
            }
            Self::ChecksumMismatch { .. }
            | Self::AddressOutOfBounds { .. }
            | Self::CorruptPage { .. }
            | Self::Compression { .. } => ErrorCode::PageCorrupted,
            Self::FileExists { .. } => ErrorCode::FileExists,
            Self::InvalidMetadata { .. } => ErrorCode::InvalidArgument,
        }
    }
}
