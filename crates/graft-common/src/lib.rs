//! # graft-common
//!
//! Common types, errors, and configuration for GraftDB.
//!
//! This crate provides the foundational types used across all GraftDB
//! components:
//!
//! - **Types**: Core identifiers (`FileId`, `PageId`) and commit `Timestamp`s
//! - **Errors**: Stable `ErrorCode`s shared by every crate-level error enum
//! - **Config**: Engine configuration loaded from TOML
//! - **Constants**: On-disk format constants and limits
//!
//! ## Example
//!
//! ```rust
//! use graft_common::types::{FileId, Timestamp};
//!
//! let id = FileId::new(7);
//! let ts = Timestamp::new(10);
//! assert!(ts < Timestamp::MAX);
//! assert_eq!(id.next(), FileId::new(8));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use constants::*;
pub use error::ErrorCode;
pub use types::{FileId, PageId, Timestamp};
