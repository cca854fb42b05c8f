//! # graft-test
//!
//! Integration tests for GraftDB.
//!
//! This crate contains:
//! - Export and import round trips between two data directories
//! - Corruption, conflict and concurrency scenarios for live import
//! - Helpers for building source tables and damaging data files

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Test utilities and helpers
pub mod utils;
