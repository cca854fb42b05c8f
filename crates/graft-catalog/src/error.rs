//! Import and catalog error types.
//!
//! Every variant carries the offending key, path or page offset so a failed
//! import can be diagnosed from the error alone.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use graft_common::types::Timestamp;
use graft_common::ErrorCode;
use graft_storage::StorageError;

/// Result type for import and catalog operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Errors raised while parsing descriptors, importing tables, or updating
/// the catalog.
#[derive(Debug, Error)]
pub enum ImportError {
    /// A configuration string does not parse.
    #[error("malformed configuration at position {position}: {reason}")]
    MalformedConfig { position: usize, reason: String },

    /// A configuration parses but a key holds an unusable value.
    #[error("invalid configuration key '{key}': {reason}")]
    InvalidConfig { key: String, reason: String },

    /// A table URI is not of a supported form.
    #[error("invalid URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// The candidate file is not a readable data file.
    #[error("{path} is not a valid data file: {reason}")]
    NotAValidDataFile { path: PathBuf, reason: String },

    /// The candidate file already backs a live table.
    #[error("{path} is in use by {uri}")]
    FileInUse { path: PathBuf, uri: String },

    /// Declared metadata disagrees with the file.
    #[error("schema conflict on '{key}': declared {declared}, file has {actual}")]
    SchemaConflict {
        key: String,
        declared: String,
        actual: String,
    },

    /// A non-repair import did not supply file metadata.
    #[error("import of {uri} requires file_metadata unless repair is set")]
    MissingMetadata { uri: String },

    /// Structural validation of the imported file failed.
    #[error("corrupt import file {path}{}: {reason}", .offset.map(|o| format!(" at offset {o}")).unwrap_or_default())]
    CorruptImport {
        path: PathBuf,
        offset: Option<u64>,
        reason: String,
    },

    /// The imported file holds commits newer than the stable timestamp.
    #[error("{path} holds timestamps up to {newest}, past the stable timestamp {stable}")]
    TimestampsPastStable {
        path: PathBuf,
        newest: Timestamp,
        stable: Timestamp,
    },

    /// Validation stopped because the caller asked it to.
    #[error("validation of {path} interrupted after {pages_checked} pages")]
    Interrupted { path: PathBuf, pages_checked: u64 },

    /// The destination URI already exists.
    #[error("{uri} already exists")]
    NameConflict { uri: String },

    /// Writing the catalog image failed.
    #[error("failed to persist catalog to {path}: {source}")]
    Persist { path: PathBuf, source: io::Error },

    /// Reading the catalog or a data file failed.
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    /// The catalog image could not be encoded or decoded.
    #[error("catalog serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error from the storage layer.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// An import step was attempted out of order.
    #[error("invalid import state transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl ImportError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates a schema conflict error.
    pub fn schema_conflict(
        key: impl Into<String>,
        declared: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::SchemaConflict {
            key: key.into(),
            declared: declared.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Creates a corrupt import error.
    pub fn corrupt(path: impl Into<PathBuf>, offset: Option<u64>, reason: impl Into<String>) -> Self {
        Self::CorruptImport {
            path: path.into(),
            offset,
            reason: reason.into(),
        }
    }

    /// Creates an invalid URI error.
    pub fn invalid_uri(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUri {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    /// Maps the error onto the shared error code vocabulary.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedConfig { .. } => ErrorCode::MalformedConfig,
            Self::InvalidConfig { .. } | Self::InvalidUri { .. } => ErrorCode::InvalidConfig,
            Self::NotAValidDataFile { .. } => ErrorCode::NotAValidDataFile,
            Self::FileInUse { .. } => ErrorCode::FileInUse,
            Self::SchemaConflict { .. } => ErrorCode::SchemaConflict,
            Self::MissingMetadata { .. } => ErrorCode::MissingMetadata,
            Self::CorruptImport { .. } => ErrorCode::CorruptImport,
            Self::TimestampsPastStable { .. } => ErrorCode::TimestampsPastStable,
            Self::Interrupted { .. } => ErrorCode::Cancelled,
            Self::NameConflict { .. } => ErrorCode::NameConflict,
            Self::Persist { .. } | Self::Io { .. } => ErrorCode::Io,
            Self::Serialization(_) => ErrorCode::Corruption,
            Self::Storage(e) => e.code(),
            Self::InvalidTransition { .. } => ErrorCode::Internal,
        }
    }

    /// Returns true if the caller can fix the failure by changing the
    /// request.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedConfig { .. }
                | Self::InvalidConfig { .. }
                | Self::InvalidUri { .. }
                | Self::SchemaConflict { .. }
                | Self::MissingMetadata { .. }
                | Self::NameConflict { .. }
                | Self::FileInUse { .. }
                | Self::TimestampsPastStable { .. }
        )
    }

    /// Returns true if repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Persist { .. } | Self::Io { .. } | Self::Interrupted { .. } => true,
            Self::Storage(StorageError::Io { .. }) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ImportError::corrupt("/d/t.gft", Some(8192), "checksum mismatch");
        assert_eq!(
            err.to_string(),
            "corrupt import file /d/t.gft at offset 8192: checksum mismatch"
        );
        let err = ImportError::corrupt("/d/t.gft", None, "entry count mismatch");
        assert_eq!(err.to_string(), "corrupt import file /d/t.gft: entry count mismatch");
    }

    #[test]
    fn test_codes() {
        assert_eq!(
            ImportError::NameConflict { uri: "table:t".into() }.code(),
            ErrorCode::NameConflict
        );
        assert_eq!(
            ImportError::schema_conflict("allocation_size", 4096, 8192).code(),
            ErrorCode::SchemaConflict
        );
        let storage = ImportError::from(StorageError::corrupt_page(4096, "bad"));
        assert_eq!(storage.code(), ErrorCode::PageCorrupted);
    }

    #[test]
    fn test_classification() {
        let conflict = ImportError::NameConflict { uri: "table:t".into() };
        assert!(conflict.is_caller_error());
        assert!(!conflict.is_retryable());

        let persist = ImportError::Persist {
            path: PathBuf::from("catalog.json"),
            source: io::Error::new(io::ErrorKind::Other, "disk full"),
        };
        assert!(persist.is_retryable());
        assert!(!persist.is_caller_error());

        let corrupt = ImportError::corrupt("f", Some(0), "x");
        assert!(!corrupt.is_caller_error());
        assert!(!corrupt.is_retryable());
    }
}
