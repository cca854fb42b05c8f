//! Type definitions for GraftDB.
//!
//! This module contains the identifier and timestamp types used across the
//! storage, MVCC, catalog and engine layers.

mod ids;
mod timestamps;

pub use ids::{FileId, PageId};
pub use timestamps::Timestamp;
