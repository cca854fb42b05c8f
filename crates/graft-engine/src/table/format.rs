//! Typed row packing.
//!
//! Keys and values are stored as byte strings; a table's `key_format` and
//! `value_format` say how typed fields are laid out inside them.
//!
//! - Integers are big-endian with the sign bit flipped, so packed keys sort
//!   the same way as the numbers they hold.
//! - `S` strings end with a NUL byte.
//! - `Ns` strings are padded with NULs to `N` bytes.
//! - `u` bytes take the rest of the buffer when last, and carry a 4-byte
//!   length prefix otherwise.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use graft_catalog::FieldType;

use crate::error::{EngineError, EngineResult};

/// A single typed field value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Datum {
    /// Signed integer.
    Int(i64),
    /// Unsigned integer or record number.
    UInt(u64),
    /// UTF-8 string.
    Str(String),
    /// Raw bytes.
    Bytes(Bytes),
}

impl Datum {
    /// Short name of the datum's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Str(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Returns the value as a signed integer, if it is one that fits.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Returns the value as an unsigned integer, if it is one that fits.
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Self::UInt(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Returns the string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the byte value.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::UInt(v) => write!(f, "{}", v),
            Self::Str(s) => write!(f, "{:?}", s),
            Self::Bytes(b) => {
                f.write_str("0x")?;
                for byte in b.iter() {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Datum {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Datum {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Bytes> for Datum {
    fn from(v: Bytes) -> Self {
        Self::Bytes(v)
    }
}

impl From<&[u8]> for Datum {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(Bytes::copy_from_slice(v))
    }
}

fn mismatch(index: usize, field: &FieldType, datum: &Datum) -> EngineError {
    EngineError::TypeMismatch {
        index,
        expected: field.to_string(),
        found: datum.to_string(),
    }
}

fn int_range(width: u8, signed: bool) -> (i128, i128) {
    let bits = u32::from(width) * 8;
    if signed {
        (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
    } else {
        (0, (1i128 << bits) - 1)
    }
}

/// Packs `values` according to `fields`.
pub fn pack(fields: &[FieldType], values: &[Datum]) -> EngineResult<Bytes> {
    if fields.len() != values.len() {
        return Err(EngineError::ArityMismatch {
            expected: fields.len(),
            found: values.len(),
        });
    }
    let mut buf = BytesMut::new();
    let last = fields.len().saturating_sub(1);
    for (index, (field, datum)) in fields.iter().zip(values).enumerate() {
        match *field {
            FieldType::Int { width, signed } => {
                let v: i128 = match datum {
                    Datum::Int(v) => i128::from(*v),
                    Datum::UInt(v) => i128::from(*v),
                    _ => return Err(mismatch(index, field, datum)),
                };
                let (min, max) = int_range(width, signed);
                if v < min || v > max {
                    return Err(mismatch(index, field, datum));
                }
                let biased = if signed { v - min } else { v };
                let raw = (biased as u64).to_be_bytes();
                buf.put_slice(&raw[8 - usize::from(width)..]);
            }
            FieldType::Recno => {
                let v = datum.as_uint().ok_or_else(|| mismatch(index, field, datum))?;
                buf.put_u64(v);
            }
            FieldType::String => {
                let s = datum.as_str().ok_or_else(|| mismatch(index, field, datum))?;
                if s.as_bytes().contains(&0) {
                    return Err(mismatch(index, field, datum));
                }
                buf.put_slice(s.as_bytes());
                buf.put_u8(0);
            }
            FieldType::FixedString(len) => {
                let s = datum.as_str().ok_or_else(|| mismatch(index, field, datum))?;
                if s.len() > len {
                    return Err(mismatch(index, field, datum));
                }
                buf.put_slice(s.as_bytes());
                buf.put_bytes(0, len - s.len());
            }
            FieldType::Bytes => {
                let b = datum.as_bytes().ok_or_else(|| mismatch(index, field, datum))?;
                if index != last {
                    let len = u32::try_from(b.len()).map_err(|_| mismatch(index, field, datum))?;
                    buf.put_u32(len);
                }
                buf.put_slice(b);
            }
        }
    }
    Ok(buf.freeze())
}

struct RowReader<'a> {
    rest: &'a [u8],
}

impl<'a> RowReader<'a> {
    fn take(&mut self, n: usize, what: &FieldType) -> EngineResult<&'a [u8]> {
        if self.rest.len() < n {
            return Err(EngineError::malformed(format!(
                "{} needs {} bytes, {} left",
                what,
                n,
                self.rest.len()
            )));
        }
        let (head, tail) = self.rest.split_at(n);
        self.rest = tail;
        Ok(head)
    }

    fn take_array<const N: usize>(&mut self, what: &FieldType) -> EngineResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }
}

/// Unpacks a buffer written by [`pack`] with the same `fields`.
pub fn unpack(fields: &[FieldType], data: &[u8]) -> EngineResult<Vec<Datum>> {
    let mut reader = RowReader { rest: data };
    let last = fields.len().saturating_sub(1);
    let mut values = Vec::with_capacity(fields.len());
    for (index, field) in fields.iter().enumerate() {
        let datum = match *field {
            FieldType::Int { width, signed } => {
                let raw = reader.take(usize::from(width), field)?;
                let mut wide = [0u8; 8];
                wide[8 - raw.len()..].copy_from_slice(raw);
                let biased = u64::from_be_bytes(wide);
                if signed {
                    let (min, _) = int_range(width, true);
                    // The biased value spans exactly the signed range.
                    Datum::Int((i128::from(biased) + min) as i64)
                } else {
                    Datum::UInt(biased)
                }
            }
            FieldType::Recno => Datum::UInt(u64::from_be_bytes(reader.take_array::<8>(field)?)),
            FieldType::String => {
                let end = reader
                    .rest
                    .iter()
                    .position(|b| *b == 0)
                    .ok_or_else(|| EngineError::malformed("string without terminator"))?;
                let raw = reader.take(end + 1, field)?;
                Datum::Str(utf8(&raw[..end])?)
            }
            FieldType::FixedString(len) => {
                let raw = reader.take(len, field)?;
                let end = raw.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
                Datum::Str(utf8(&raw[..end])?)
            }
            FieldType::Bytes => {
                let len = if index == last {
                    reader.rest.len()
                } else {
                    u32::from_be_bytes(reader.take_array::<4>(field)?) as usize
                };
                Datum::Bytes(Bytes::copy_from_slice(reader.take(len, field)?))
            }
        };
        values.push(datum);
    }
    if !reader.rest.is_empty() {
        return Err(EngineError::malformed(format!(
            "{} trailing bytes",
            reader.rest.len()
        )));
    }
    Ok(values)
}

fn utf8(raw: &[u8]) -> EngineResult<String> {
    String::from_utf8(raw.to_vec()).map_err(|e| EngineError::malformed(e.to_string()))
}
