//! Stable error codes.

use std::fmt;

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Unknown or unspecified error.
    Unknown = 0x0000,
    /// Internal error (bug).
    Internal = 0x0001,
    /// Invalid argument provided.
    InvalidArgument = 0x0003,
    /// Operation was cancelled.
    Cancelled = 0x0005,

    // I/O errors (0x0100 - 0x01FF)
    /// General I/O error.
    Io = 0x0100,
    /// File not found.
    FileNotFound = 0x0101,
    /// File already exists.
    FileExists = 0x0102,
    /// Data corruption detected.
    Corruption = 0x0104,

    // Storage errors (0x0200 - 0x02FF)
    /// Page is corrupted.
    PageCorrupted = 0x0201,
    /// Key too large.
    KeyTooLarge = 0x0205,
    /// Value too large.
    ValueTooLarge = 0x0206,
    /// File is not a data file this engine understands.
    NotAValidDataFile = 0x0207,

    // Configuration errors (0x0300 - 0x03FF)
    /// Configuration string could not be parsed.
    MalformedConfig = 0x0300,
    /// Configuration parsed but holds an unusable value.
    InvalidConfig = 0x0301,

    // Import errors (0x0400 - 0x04FF)
    /// Table-level and physical-level metadata disagree.
    SchemaConflict = 0x0400,
    /// Import requested without metadata and without repair.
    MissingMetadata = 0x0401,
    /// Imported file failed structural verification.
    CorruptImport = 0x0402,
    /// Imported file holds timestamps newer than the stable timestamp.
    TimestampsPastStable = 0x0403,

    // Catalog errors (0x0500 - 0x05FF)
    /// URI already present in the catalog.
    NameConflict = 0x0500,
    /// Data file already backs a live catalog entry.
    FileInUse = 0x0501,
    /// URI not present in the catalog.
    TableNotFound = 0x0502,

    // MVCC errors (0x0600 - 0x06FF)
    /// Commit timestamp older than an existing version.
    TimestampOutOfOrder = 0x0600,
    /// Row does not match the table's format.
    TypeMismatch = 0x0601,
    /// Projection names an unknown column.
    ColumnNotFound = 0x0602,
    /// Key already holds as many versions as a data file can store.
    HistoryFull = 0x0603,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "I/O",
            0x02 => "Storage",
            0x03 => "Config",
            0x04 => "Import",
            0x05 => "Catalog",
            0x06 => "MVCC",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_categories() {
        assert_eq!(ErrorCode::Io.category(), "I/O");
        assert_eq!(ErrorCode::CorruptImport.category(), "Import");
        assert_eq!(ErrorCode::NameConflict.category(), "Catalog");
        assert_eq!(ErrorCode::MalformedConfig.category(), "Config");
        assert_eq!(ErrorCode::TimestampOutOfOrder.category(), "MVCC");
    }

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Unknown.as_u16(), 0);
        assert_eq!(ErrorCode::CorruptImport.as_u16(), 0x0402);
        assert_eq!(ErrorCode::NameConflict.to_string(), "NameConflict");
    }
}
