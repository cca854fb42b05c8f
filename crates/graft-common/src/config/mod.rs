//! Configuration for GraftDB.
//!
//! This module provides the engine configuration, loadable from TOML.

mod engine;

pub use engine::{ConfigError, EngineConfig, TableDefaults};
