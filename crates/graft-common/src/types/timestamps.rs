//! Commit timestamps.
//!
//! Timestamps are application-assigned logical values: a write is stamped
//! with the commit timestamp chosen by the caller, and reads name the
//! point in that timeline they want to observe.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A logical commit timestamp.
///
/// # Example
///
/// ```rust
/// use graft_common::types::Timestamp;
///
/// let ts = Timestamp::new(20);
/// assert!(Timestamp::new(10) < ts);
/// assert_eq!(ts.as_u64(), 20);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The zero timestamp. Versions written without a timestamp use it.
    pub const ZERO: Self = Self(0);

    /// Maximum timestamp value. A version whose stop timestamp is `MAX`
    /// has not been superseded.
    pub const MAX: Self = Self(u64::MAX);

    /// Creates a timestamp from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(ts: u64) -> Self {
        Self(ts)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true if this is the open-ended `MAX` timestamp.
    #[inline]
    #[must_use]
    pub const fn is_max(self) -> bool {
        self.0 == u64::MAX
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_max() {
            write!(f, "Timestamp(MAX)")
        } else {
            write!(f, "Timestamp({})", self.0)
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_max() {
            write!(f, "max")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<u64> for Timestamp {
    #[inline]
    fn from(ts: u64) -> Self {
        Self::new(ts)
    }
}
