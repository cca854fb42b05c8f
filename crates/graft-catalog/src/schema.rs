//! Table schemas.
//!
//! A table's key and value layouts are described by format strings, one
//! character per field with an optional repeat count:
//!
//! | Char | Field |
//! |------|-------|
//! | `b` `h` `i` `l` `q` | signed integer of 1, 2, 4, 4, 8 bytes |
//! | `B` `H` `I` `L` `Q` | unsigned integer of 1, 2, 4, 4, 8 bytes |
//! | `r` | record number (unsigned 8 bytes) |
//! | `S` | NUL-free string |
//! | `s` | fixed-length string, count is the length |
//! | `u` | raw bytes |
//! | `x` | padding byte, not a field |
//!
//! `3i` is three integer fields; `10s` is one 10-byte string field.

use std::fmt;

use crate::descriptor::FormatDescriptor;
use crate::error::{ImportError, ImportResult};

/// Default key and value format: one raw byte string.
pub const DEFAULT_FORMAT: &str = "u";

/// A single field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Fixed-width integer.
    Int {
        /// Width in bytes.
        width: u8,
        /// Whether the integer is signed.
        signed: bool,
    },
    /// Record number.
    Recno,
    /// Variable-length string.
    String,
    /// Fixed-length string of the given byte length.
    FixedString(usize),
    /// Raw bytes.
    Bytes,
}

impl FieldType {
    /// Returns true for integer and record number fields.
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Int { .. } | Self::Recno)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int { width, signed } => {
                write!(f, "{}int{}", if *signed { "" } else { "u" }, u32::from(*width) * 8)
            }
            Self::Recno => f.write_str("recno"),
            Self::String => f.write_str("string"),
            Self::FixedString(n) => write!(f, "string({})", n),
            Self::Bytes => f.write_str("bytes"),
        }
    }
}

/// Parses a format string into its fields.
pub fn parse_format(format: &str) -> Result<Vec<FieldType>, String> {
    if format.is_empty() {
        return Err("empty format".to_string());
    }
    let mut fields = Vec::new();
    let mut chars = format.char_indices().peekable();
    while let Some((start, _)) = chars.peek().copied() {
        let mut end = start;
        while let Some((i, c)) = chars.peek().copied() {
            if !c.is_ascii_digit() {
                break;
            }
            end = i + 1;
            chars.next();
        }
        let count = if end > start {
            format[start..end]
                .parse::<usize>()
                .map_err(|_| format!("bad repeat count '{}'", &format[start..end]))?
        } else {
            1
        };
        let Some((pos, c)) = chars.next() else {
            return Err("repeat count without a type".to_string());
        };
        let field = match c {
            'b' => FieldType::Int { width: 1, signed: true },
            'B' => FieldType::Int { width: 1, signed: false },
            'h' => FieldType::Int { width: 2, signed: true },
            'H' => FieldType::Int { width: 2, signed: false },
            'i' | 'l' => FieldType::Int { width: 4, signed: true },
            'I' | 'L' => FieldType::Int { width: 4, signed: false },
            'q' => FieldType::Int { width: 8, signed: true },
            'Q' => FieldType::Int { width: 8, signed: false },
            'r' => FieldType::Recno,
            'S' => FieldType::String,
            'u' => FieldType::Bytes,
            's' => {
                fields.push(FieldType::FixedString(count));
                continue;
            }
            'x' => continue,
            other => return Err(format!("unknown type '{}' at position {}", other, pos)),
        };
        fields.extend(std::iter::repeat(field).take(count));
    }
    Ok(fields)
}

/// Key and value layout of a table, plus optional column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Key format string.
    pub key_format: String,
    /// Value format string.
    pub value_format: String,
    /// Parsed key fields.
    pub key_fields: Vec<FieldType>,
    /// Parsed value fields.
    pub value_fields: Vec<FieldType>,
    /// Column names, key columns first, if declared.
    pub columns: Option<Vec<String>>,
}

impl Schema {
    /// Builds the schema declared by a table configuration.
    ///
    /// Missing formats default to raw bytes.
    pub fn from_config(config: &FormatDescriptor) -> ImportResult<Self> {
        let key_format = format_value(config, "key_format")?;
        let value_format = format_value(config, "value_format")?;
        let key_fields = parse_format(&key_format)
            .map_err(|reason| ImportError::invalid_config("key_format", reason))?;
        let value_fields = parse_format(&value_format)
            .map_err(|reason| ImportError::invalid_config("value_format", reason))?;
        let columns = match config.get("columns") {
            None => None,
            Some(value) => {
                let group = value.as_group().ok_or_else(|| {
                    ImportError::invalid_config("columns", "expected a parenthesized list")
                })?;
                Some(group.keys().map(str::to_string).collect())
            }
        };
        Ok(Self {
            key_format,
            value_format,
            key_fields,
            value_fields,
            columns,
        })
    }

    /// Number of key plus value fields.
    pub fn arity(&self) -> usize {
        self.key_fields.len() + self.value_fields.len()
    }

    /// Checks that the declared column list names every field exactly once.
    pub fn check_columns(&self) -> ImportResult<()> {
        if let Some(columns) = &self.columns {
            if columns.len() != self.arity() {
                return Err(ImportError::schema_conflict(
                    "columns",
                    format!("{} columns", columns.len()),
                    format!(
                        "{} fields in key_format={} value_format={}",
                        self.arity(),
                        self.key_format,
                        self.value_format
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Returns the position of a named column across key and value fields.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.as_ref()?.iter().position(|c| c == name)
    }
}

fn format_value(config: &FormatDescriptor, key: &str) -> ImportResult<String> {
    match config.get(key) {
        None => Ok(DEFAULT_FORMAT.to_string()),
        Some(value) => value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ImportError::invalid_config(key, format!("expected a string, found {}", value.kind()))),
    }
}
