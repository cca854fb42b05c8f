use bytes::Bytes;
use thiserror::Error;

use graft_common::types::Timestamp;
use graft_common::ErrorCode;

/// Result type for MVCC operations.
pub type MvccResult<T> = Result<T, MvccError>;

/// Errors raised by version chains.
#[derive(Debug, Error)]
pub enum MvccError {
    /// A write is older than the newest version of its key.
    #[error("commit timestamp {commit_ts} older than newest version {newest_ts} of key {key:?}")]
    TimestampOutOfOrder {
        /// Key being written.
        key: Bytes,
        /// Rejected commit timestamp.
        commit_ts: Timestamp,
        /// Newest existing version.
        newest_ts: Timestamp,
    },

    /// A key already holds the most versions a data file entry can store.
    #[error("key {key:?} already holds {limit} versions")]
    HistoryFull {
        /// Key being written.
        key: Bytes,
        /// Versions per key a data file can hold.
        limit: usize,
    },
}

impl MvccError {
    /// Maps the error onto the shared error code vocabulary.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::TimestampOutOfOrder { .. } => ErrorCode::TimestampOutOfOrder,
            Self::HistoryFull { .. } => ErrorCode::HistoryFull,
        }
    }
}
