//! Engine error types.

use std::path::PathBuf;

use thiserror::Error;

use graft_catalog::ImportError;
use graft_common::config::ConfigError;
use graft_common::error::ErrorCode;
use graft_mvcc::MvccError;
use graft_storage::StorageError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by the database, sessions and cursors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Create, import, commit or catalog failure.
    #[error(transparent)]
    Import(#[from] ImportError),

    /// Data file failure outside an import.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Write rejected by the version store.
    #[error(transparent)]
    Mvcc(#[from] MvccError),

    /// Engine configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No table is registered under the URI.
    #[error("table not found: {uri}")]
    TableNotFound { uri: String },

    /// The data directory is absent and may not be created.
    #[error("data directory {path} does not exist")]
    DataDirMissing { path: PathBuf },

    /// Key longer than the table's `leaf_key_max`.
    #[error("key of {size} bytes exceeds leaf_key_max={max} in {uri}")]
    KeyTooLarge { uri: String, size: usize, max: usize },

    /// Value longer than the table's `leaf_value_max`.
    #[error("value of {size} bytes exceeds leaf_value_max={max} in {uri}")]
    ValueTooLarge { uri: String, size: usize, max: usize },

    /// Projection names a column the table does not declare.
    #[error("column '{column}' not found in {uri}")]
    ColumnNotFound { uri: String, column: String },

    /// A datum does not fit its field type.
    #[error("field {index}: expected {expected}, found {found}")]
    TypeMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    /// Wrong number of datums for a key or value.
    #[error("expected {expected} fields, found {found}")]
    ArityMismatch { expected: usize, found: usize },

    /// Stored bytes do not decode under the table's formats.
    #[error("malformed row: {reason}")]
    MalformedRow { reason: String },

    /// Another checkpoint is running.
    #[error("checkpoint already in progress")]
    CheckpointInProgress,

    /// The database has been closed.
    #[error("database is closed")]
    Closed,

    /// Filesystem failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// Creates a table-not-found error.
    pub fn table_not_found(uri: impl Into<String>) -> Self {
        Self::TableNotFound { uri: uri.into() }
    }

    /// Creates a malformed-row error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRow {
            reason: reason.into(),
        }
    }

    /// Returns the stable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Import(e) => e.code(),
            Self::Storage(e) => e.code(),
            Self::Mvcc(e) => e.code(),
            Self::Config(_) => ErrorCode::InvalidConfig,
            Self::TableNotFound { .. } => ErrorCode::TableNotFound,
            Self::DataDirMissing { .. } => ErrorCode::FileNotFound,
            Self::KeyTooLarge { .. } => ErrorCode::KeyTooLarge,
            Self::ValueTooLarge { .. } => ErrorCode::ValueTooLarge,
            Self::ColumnNotFound { .. } => ErrorCode::ColumnNotFound,
            Self::TypeMismatch { .. } | Self::ArityMismatch { .. } => ErrorCode::TypeMismatch,
            Self::MalformedRow { .. } => ErrorCode::Corruption,
            Self::CheckpointInProgress | Self::Closed => ErrorCode::Internal,
            Self::Io { .. } => ErrorCode::Io,
        }
    }

    /// Returns the import error, if this wraps one.
    pub fn as_import(&self) -> Option<&ImportError> {
        match self {
            Self::Import(e) => Some(e),
            _ => None,
        }
    }
}
