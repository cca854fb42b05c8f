//! Table and file URIs.

use graft_common::constants::{DATA_FILE_EXTENSION, FILE_URI_PREFIX, TABLE_URI_PREFIX};

use crate::error::{ImportError, ImportResult};

/// A parsed catalog URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uri<'a> {
    /// `table:<name>`, backed by `<name>.gft`.
    Table(&'a str),
    /// `file:<name>`, naming a data file directly.
    File(&'a str),
}

impl<'a> Uri<'a> {
    /// Parses a URI, rejecting names that could escape the data directory.
    pub fn parse(uri: &'a str) -> ImportResult<Self> {
        let parsed = if let Some(name) = uri.strip_prefix(TABLE_URI_PREFIX) {
            Uri::Table(name)
        } else if let Some(name) = uri.strip_prefix(FILE_URI_PREFIX) {
            Uri::File(name)
        } else {
            return Err(ImportError::invalid_uri(uri, "expected a table: or file: prefix"));
        };
        let name = parsed.name();
        if name.is_empty() {
            return Err(ImportError::invalid_uri(uri, "empty name"));
        }
        if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
            return Err(ImportError::invalid_uri(uri, "name must be a plain file name"));
        }
        Ok(parsed)
    }

    /// Name after the prefix.
    pub fn name(&self) -> &'a str {
        match self {
            Uri::Table(name) | Uri::File(name) => name,
        }
    }

    /// Name of the backing data file inside the data directory.
    pub fn data_file_name(&self) -> String {
        match self {
            Uri::Table(name) => format!("{}.{}", name, DATA_FILE_EXTENSION),
            Uri::File(name) => (*name).to_string(),
        }
    }
}

/// Returns the data file name backing `uri`.
pub fn data_file_name(uri: &str) -> ImportResult<String> {
    Ok(Uri::parse(uri)?.data_file_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(Uri::parse("table:orders").unwrap(), Uri::Table("orders"));
        assert_eq!(Uri::parse("file:orders.gft").unwrap(), Uri::File("orders.gft"));
        assert_eq!(data_file_name("table:orders").unwrap(), "orders.gft");
        assert_eq!(data_file_name("file:x.gft").unwrap(), "x.gft");
    }

    #[test]
    fn test_rejects() {
        for uri in ["orders", "table:", "table:../x", "file:a/b", "table:..", "index:t"] {
            assert!(
                matches!(Uri::parse(uri), Err(ImportError::InvalidUri { .. })),
                "{uri}"
            );
        }
    }
}
