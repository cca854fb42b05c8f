//! Engine configuration structures.
//!
//! `EngineConfig` describes a database instance: where it lives on disk and
//! what it does on open and close. `TableDefaults` supplies the physical
//! settings given to natively created tables that do not name their own.
//! Imported tables never take physical settings from here; those always come
//! from the imported file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::constants::{
    DEFAULT_ALLOCATION_SIZE, DEFAULT_INTERNAL_PAGE_MAX, DEFAULT_LEAF_KEY_MAX,
    DEFAULT_LEAF_PAGE_MAX, DEFAULT_LEAF_VALUE_MAX, MAX_ALLOCATION_SIZE, MAX_PAGE_SIZE,
    MIN_ALLOCATION_SIZE,
};

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the configuration file failed.
    #[error("config I/O error on {path}: {source}")]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The TOML document could not be decoded.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be encoded.
    #[error("config encode error: {0}")]
    Encode(#[from] toml::ser::Error),

    /// A field holds an unusable value.
    #[error("invalid config field '{field}': {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Main engine configuration.
///
/// # Example
///
/// ```rust
/// use graft_common::config::EngineConfig;
///
/// let config = EngineConfig::with_data_dir("/tmp/graft").with_checkpoint_on_close(false);
/// assert!(!config.checkpoint_on_close);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the catalog and every data file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Create the data directory and an empty catalog if absent.
    #[serde(default = "default_true")]
    pub create_if_missing: bool,

    /// Take a final checkpoint when the database is closed.
    #[serde(default = "default_true")]
    pub checkpoint_on_close: bool,

    /// Run full structural verification on every table when opening.
    #[serde(default)]
    pub verify_on_open: bool,

    /// Physical settings for natively created tables.
    #[serde(default)]
    pub table_defaults: TableDefaults,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./graft-data")
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            create_if_missing: true,
            checkpoint_on_close: true,
            verify_on_open: false,
            table_defaults: TableDefaults::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with the specified data directory.
    #[must_use]
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Sets whether a final checkpoint is taken on close.
    #[must_use]
    pub fn with_checkpoint_on_close(mut self, enabled: bool) -> Self {
        self.checkpoint_on_close = enabled;
        self
    }

    /// Sets whether every table is verified on open.
    #[must_use]
    pub fn with_verify_on_open(mut self, enabled: bool) -> Self {
        self.verify_on_open = enabled;
        self
    }

    /// Sets whether a missing data directory is created.
    #[must_use]
    pub fn with_create_if_missing(mut self, enabled: bool) -> Self {
        self.create_if_missing = enabled;
        self
    }

    /// Replaces the native table defaults.
    #[must_use]
    pub fn with_table_defaults(mut self, defaults: TableDefaults) -> Self {
        self.table_defaults = defaults;
        self
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Serializes configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::invalid("data_dir", "must not be empty"));
        }
        self.table_defaults.validate()
    }
}

/// Physical settings applied to natively created tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefaults {
    /// File allocation unit in bytes. Power of two.
    #[serde(default = "default_allocation_size")]
    pub allocation_size: u32,

    /// Maximum internal page size in bytes.
    #[serde(default = "default_internal_page_max")]
    pub internal_page_max: u32,

    /// Maximum leaf page size in bytes.
    #[serde(default = "default_leaf_page_max")]
    pub leaf_page_max: u32,

    /// Maximum leaf key size in bytes (0 = unlimited).
    #[serde(default)]
    pub leaf_key_max: u32,

    /// Maximum leaf value size in bytes (0 = unlimited).
    #[serde(default)]
    pub leaf_value_max: u32,

    /// Checksum mode: "none", "uncompressed" or "full".
    #[serde(default = "default_checksum")]
    pub checksum: String,

    /// Block compressor name, if any ("snappy" or "zlib").
    #[serde(default)]
    pub block_compressor: Option<String>,

    /// Whether tables are logged.
    #[serde(default)]
    pub log_enabled: bool,
}

fn default_allocation_size() -> u32 {
    DEFAULT_ALLOCATION_SIZE
}

fn default_internal_page_max() -> u32 {
    DEFAULT_INTERNAL_PAGE_MAX
}

fn default_leaf_page_max() -> u32 {
    DEFAULT_LEAF_PAGE_MAX
}

fn default_checksum() -> String {
    "uncompressed".to_string()
}

impl Default for TableDefaults {
    fn default() -> Self {
        Self {
            allocation_size: DEFAULT_ALLOCATION_SIZE,
            internal_page_max: DEFAULT_INTERNAL_PAGE_MAX,
            leaf_page_max: DEFAULT_LEAF_PAGE_MAX,
            leaf_key_max: DEFAULT_LEAF_KEY_MAX,
            leaf_value_max: DEFAULT_LEAF_VALUE_MAX,
            checksum: default_checksum(),
            block_compressor: None,
            log_enabled: false,
        }
    }
}

impl TableDefaults {
    /// Validates sizes and names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.allocation_size.is_power_of_two()
            || !(MIN_ALLOCATION_SIZE..=MAX_ALLOCATION_SIZE).contains(&self.allocation_size)
        {
            return Err(ConfigError::invalid(
                "allocation_size",
                format!(
                    "{} is not a power of two between {} and {}",
                    self.allocation_size, MIN_ALLOCATION_SIZE, MAX_ALLOCATION_SIZE
                ),
            ));
        }
        for (field, value) in [
            ("internal_page_max", self.internal_page_max),
            ("leaf_page_max", self.leaf_page_max),
        ] {
            if value < self.allocation_size || value > MAX_PAGE_SIZE {
                return Err(ConfigError::invalid(
                    field,
                    format!("{} must lie between allocation_size and {}", value, MAX_PAGE_SIZE),
                ));
            }
        }
        if !matches!(self.checksum.as_str(), "none" | "uncompressed" | "full") {
            return Err(ConfigError::invalid(
                "checksum",
                format!("unknown checksum mode '{}'", self.checksum),
            ));
        }
        if let Some(name) = &self.block_compressor {
            if !matches!(name.as_str(), "snappy" | "zlib") {
                return Err(ConfigError::invalid(
                    "block_compressor",
                    format!("unknown compressor '{}'", name),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.checkpoint_on_close);
        assert_eq!(config.table_defaults.allocation_size, 4096);
    }

    #[test]
    fn test_invalid_allocation_size() {
        let defaults = TableDefaults {
            allocation_size: 1000,
            ..Default::default()
        };
        assert!(matches!(
            defaults.validate(),
            Err(ConfigError::Invalid {
                field: "allocation_size",
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_compressor() {
        let defaults = TableDefaults {
            block_compressor: Some("lz77".into()),
            ..Default::default()
        };
        assert!(defaults.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graft.toml");

        let config = EngineConfig::with_data_dir("/var/lib/graft").with_verify_on_open(true);
        config.save(&path).unwrap();

        let loaded = EngineConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            data_dir = "/data"

            [table_defaults]
            block_compressor = "snappy"
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert!(config.create_if_missing);
        assert_eq!(config.table_defaults.block_compressor.as_deref(), Some("snappy"));
        assert_eq!(config.table_defaults.leaf_page_max, DEFAULT_LEAF_PAGE_MAX);
    }
}
