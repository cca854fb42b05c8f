//! # graft-mvcc
//!
//! Multi-version concurrency control for GraftDB.
//!
//! This crate implements:
//! - Version chains stamped with commit timestamps
//! - Timestamp visibility (`start_ts <= read_ts < stop_ts`)
//! - Conversion to and from the on-disk leaf entry representation, so a
//!   table's full history survives checkpoints and imports

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Error types
pub mod error;

/// Version chain storage
pub mod version;

pub use error::{MvccError, MvccResult};
pub use version::{Version, VersionChain, VersionStore};
