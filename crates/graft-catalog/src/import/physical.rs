//! Physical configuration keys.
//!
//! Physical keys describe how a data file is laid out on disk. For an
//! imported table they are always dictated by the file itself; configuration
//! may restate them but never change them.

use graft_common::config::TableDefaults;
use graft_common::constants::{DATA_FILE_FORMAT_VERSION, MIN_SUPPORTED_FORMAT_VERSION};
use graft_common::types::FileId;
use graft_storage::{ChecksumMode, Compressor, FileMetadata, PageSizing, StorageError};

use crate::descriptor::{ConfigValue, FormatDescriptor};
use crate::error::{ImportError, ImportResult};
use crate::schema::{parse_format, DEFAULT_FORMAT};

/// Physical keys in canonical order.
pub const PHYSICAL_KEYS: [&str; 9] = [
    "allocation_size",
    "block_compressor",
    "checksum",
    "format_version",
    "internal_page_max",
    "leaf_key_max",
    "leaf_page_max",
    "leaf_value_max",
    "log",
];

/// Returns true if `key` is a physical key.
pub fn is_physical_key(key: &str) -> bool {
    PHYSICAL_KEYS.contains(&key)
}

fn log_group(enabled: bool) -> ConfigValue {
    let mut group = FormatDescriptor::new();
    group.set("enabled", enabled);
    ConfigValue::Group(group)
}

/// Returns the canonical configuration value of a physical key for `meta`.
pub fn physical_value(key: &str, meta: &FileMetadata) -> Option<ConfigValue> {
    let value = match key {
        "allocation_size" => ConfigValue::from(meta.allocation_size),
        "block_compressor" => ConfigValue::from(meta.compressor.map_or("", Compressor::name)),
        "checksum" => ConfigValue::from(meta.checksum_mode.as_str()),
        "format_version" => ConfigValue::from(meta.format_version),
        "internal_page_max" => ConfigValue::from(meta.page_sizing.internal_max),
        "leaf_key_max" => ConfigValue::from(meta.page_sizing.leaf_key_max),
        "leaf_page_max" => ConfigValue::from(meta.page_sizing.leaf_max),
        "leaf_value_max" => ConfigValue::from(meta.page_sizing.leaf_value_max),
        "log" => log_group(meta.is_log_enabled),
        _ => return None,
    };
    Some(value)
}

/// Returns every physical key of `meta` in canonical order.
pub fn physical_entries(meta: &FileMetadata) -> Vec<(&'static str, ConfigValue)> {
    PHYSICAL_KEYS
        .iter()
        .filter_map(|key| physical_value(key, meta).map(|v| (*key, v)))
        .collect()
}

fn parse_compressor(key: &str, value: &ConfigValue) -> ImportResult<Option<Compressor>> {
    let name = value
        .as_str()
        .ok_or_else(|| ImportError::invalid_config(key, format!("expected a name, found {}", value.kind())))?;
    match name {
        "" | "none" => Ok(None),
        other => Compressor::from_name(other)
            .map(Some)
            .ok_or_else(|| ImportError::invalid_config(key, format!("unknown compressor '{}'", other))),
    }
}

fn parse_checksum(key: &str, value: &ConfigValue) -> ImportResult<ChecksumMode> {
    value
        .as_str()
        .and_then(ChecksumMode::from_name)
        .ok_or_else(|| ImportError::invalid_config(key, format!("unknown checksum mode '{}'", value)))
}

fn parse_u32(key: &str, value: &ConfigValue) -> ImportResult<u32> {
    let n = value
        .as_int()
        .ok_or_else(|| ImportError::invalid_config(key, format!("expected an integer, found {}", value.kind())))?;
    u32::try_from(n).map_err(|_| ImportError::invalid_config(key, format!("{} out of range", n)))
}

/// Reads `log=(enabled=…)`. `None` when the group does not say.
fn parse_log(key: &str, value: &ConfigValue) -> ImportResult<Option<bool>> {
    let group = value
        .as_group()
        .ok_or_else(|| ImportError::invalid_config(key, "expected (enabled=true|false)"))?;
    match group.get("enabled") {
        None => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| ImportError::invalid_config("log.enabled", format!("expected a boolean, found {}", v))),
    }
}

/// Checks that a declared physical key agrees with the file.
///
/// Values are compared by meaning, so `checksum=on` agrees with a file whose
/// checksum mode is `full` and `allocation_size=4KB` with one of 4096 bytes.
/// A value that cannot be interpreted at all is reported as a conflict.
pub fn check_physical(key: &str, declared: &ConfigValue, meta: &FileMetadata) -> ImportResult<()> {
    let Some(actual) = physical_value(key, meta) else {
        return Ok(());
    };
    let conflict = || ImportError::schema_conflict(key, declared, &actual);
    let agrees = match key {
        "block_compressor" => parse_compressor(key, declared).map_err(|_| conflict())? == meta.compressor,
        "checksum" => parse_checksum(key, declared).map_err(|_| conflict())? == meta.checksum_mode,
        "log" => match parse_log(key, declared).map_err(|_| conflict())? {
            Some(enabled) => enabled == meta.is_log_enabled,
            None => true,
        },
        _ => declared.as_int().is_some_and(|n| Some(n) == actual.as_int()),
    };
    if agrees {
        Ok(())
    } else {
        Err(conflict())
    }
}

/// Builds the metadata for a natively created table.
///
/// Physical keys present in `config` win; the rest come from `defaults`.
pub fn file_metadata_from_config(
    config: &FormatDescriptor,
    file_id: FileId,
    defaults: &TableDefaults,
) -> ImportResult<FileMetadata> {
    let u32_or = |key: &str, default: u32| -> ImportResult<u32> {
        config.get(key).map_or(Ok(default), |v| parse_u32(key, v))
    };

    let checksum_mode = match config.get("checksum") {
        Some(v) => parse_checksum("checksum", v)?,
        None => ChecksumMode::from_name(&defaults.checksum)
            .ok_or_else(|| ImportError::invalid_config("checksum", format!("unknown checksum mode '{}'", defaults.checksum)))?,
    };
    let compressor = match config.get("block_compressor") {
        Some(v) => parse_compressor("block_compressor", v)?,
        None => match &defaults.block_compressor {
            Some(name) => parse_compressor("block_compressor", &ConfigValue::from(name.as_str()))?,
            None => None,
        },
    };
    let log_enabled = match config.get("log") {
        Some(v) => parse_log("log", v)?.unwrap_or(defaults.log_enabled),
        None => defaults.log_enabled,
    };
    let format_version = u32_or("format_version", DATA_FILE_FORMAT_VERSION)?;
    if !(MIN_SUPPORTED_FORMAT_VERSION..=DATA_FILE_FORMAT_VERSION).contains(&format_version) {
        return Err(ImportError::invalid_config(
            "format_version",
            format!("unsupported version {}", format_version),
        ));
    }

    let key_format = config.get_str("key_format").unwrap_or(DEFAULT_FORMAT);
    let value_format = config.get_str("value_format").unwrap_or(DEFAULT_FORMAT);
    parse_format(key_format).map_err(|reason| ImportError::invalid_config("key_format", reason))?;
    parse_format(value_format).map_err(|reason| ImportError::invalid_config("value_format", reason))?;

    let mut meta = FileMetadata::new(file_id)
        .with_allocation_size(u32_or("allocation_size", defaults.allocation_size)?)
        .with_checksum_mode(checksum_mode)
        .with_compressor(compressor)
        .with_page_sizing(PageSizing {
            internal_max: u32_or("internal_page_max", defaults.internal_page_max)?,
            leaf_max: u32_or("leaf_page_max", defaults.leaf_page_max)?,
            leaf_key_max: u32_or("leaf_key_max", defaults.leaf_key_max)?,
            leaf_value_max: u32_or("leaf_value_max", defaults.leaf_value_max)?,
        })
        .with_log_enabled(log_enabled)
        .with_formats(key_format, value_format);
    meta.format_version = format_version;

    meta.validate().map_err(|e| match e {
        StorageError::InvalidMetadata { field, reason } => ImportError::invalid_config(field, reason),
        other => ImportError::Storage(other),
    })?;
    Ok(meta)
}
