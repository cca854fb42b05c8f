//! Page types and flags.

use std::fmt;

/// Types of tree pages in a data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PageType {
    /// Internal node (first keys and child addresses).
    Internal = 2,
    /// Leaf node (keys and their version histories).
    Leaf = 3,
}

impl PageType {
    /// Creates a PageType from a raw byte value.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            2 => Some(Self::Internal),
            3 => Some(Self::Leaf),
            _ => None,
        }
    }

    /// Returns true for leaf pages.
    #[inline]
    pub const fn is_leaf(self) -> bool {
        matches!(self, Self::Leaf)
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => write!(f, "Internal"),
            Self::Leaf => write!(f, "Leaf"),
        }
    }
}

/// Flags for page properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageFlags(u16);

impl PageFlags {
    /// Payload is block compressed.
    pub const COMPRESSED: u16 = 1 << 0;
    /// Leaf holds at least one tombstone.
    pub const HAS_TOMBSTONES: u16 = 1 << 1;

    const KNOWN: u16 = Self::COMPRESSED | Self::HAS_TOMBSTONES;

    /// Creates empty flags.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Creates flags from raw bits.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Checks if a flag is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, flag: u16) -> bool {
        (self.0 & flag) == flag
    }

    /// Sets a flag.
    #[inline]
    pub fn set(&mut self, flag: u16) {
        self.0 |= flag;
    }

    /// Returns true if bits outside the known set are present.
    #[inline]
    #[must_use]
    pub const fn has_unknown_bits(self) -> bool {
        self.0 & !Self::KNOWN != 0
    }

    /// Returns true if the payload is compressed.
    #[inline]
    #[must_use]
    pub const fn is_compressed(self) -> bool {
        self.contains(Self::COMPRESSED)
    }
}
