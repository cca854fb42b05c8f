//! # graft-catalog
//!
//! Table metadata and live import for GraftDB.
//!
//! This crate provides:
//!
//! - **Descriptors**: the `key=value,(…)` configuration language, with
//!   rendering and canonical normalization
//! - **Schemas**: key and value format strings and column lists
//! - **Catalog**: the durable URI namespace, with atomic commit
//! - **Import**: probing, reconciling, validating and committing a data file
//!   written by another instance
//!
//! ## Example
//!
//! ```rust
//! use graft_catalog::FormatDescriptor;
//!
//! let a = FormatDescriptor::parse("key_format=S,log=(enabled=false),id=4").unwrap();
//! let b = FormatDescriptor::parse("log=(enabled=false),key_format=S,id=9").unwrap();
//! assert!(a.equivalent(&b));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod descriptor;
pub mod error;
pub mod import;
pub mod schema;

pub use catalog::{Catalog, CatalogEntry, CreatedVia};
pub use descriptor::{ConfigValue, FormatDescriptor};
pub use error::{ImportError, ImportResult};
pub use import::{
    import_table, run_import, ImportContext, ImportOutcome, ImportRequest, ImportState,
    Validator, VerifyReport,
};
pub use schema::{FieldType, Schema};
