//! Error classification shared by every GraftDB crate.
//!
//! Each crate defines its own `thiserror` enum; those enums map onto the
//! stable [`ErrorCode`] values defined here so callers can branch on a
//! single vocabulary regardless of which layer failed.

mod codes;

pub use codes::ErrorCode;
