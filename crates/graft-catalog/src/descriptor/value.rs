//! Configuration values.

use std::fmt;

use super::FormatDescriptor;

/// A value in a [`FormatDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    /// String value (quoted or bare).
    Str(String),
    /// Integer value. Size suffixes are expanded when parsed.
    Int(i64),
    /// Explicit `true` or `false`.
    Bool(bool),
    /// A bare key with no value, read as `true`.
    Flag,
    /// Nested group.
    Group(FormatDescriptor),
}

impl ConfigValue {
    /// Creates a string value.
    pub fn str(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    /// Returns the string, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the boolean meaning of the value.
    ///
    /// `Flag` reads as true; integers 0 and 1 read as false and true.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Flag => Some(true),
            Self::Int(0) => Some(false),
            Self::Int(1) => Some(true),
            _ => None,
        }
    }

    /// Returns the nested group, if this is a group.
    pub fn as_group(&self) -> Option<&FormatDescriptor> {
        match self {
            Self::Group(g) => Some(g),
            _ => None,
        }
    }

    /// Short name of the value's kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Int(_) => "integer",
            Self::Bool(_) | Self::Flag => "boolean",
            Self::Group(_) => "group",
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(&super::render::render_string(s)),
            Self::Int(v) => write!(f, "{}", v),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Flag => f.write_str("true"),
            Self::Group(g) => write!(f, "({})", g),
        }
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for ConfigValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<FormatDescriptor> for ConfigValue {
    fn from(v: FormatDescriptor) -> Self {
        Self::Group(v)
    }
}
