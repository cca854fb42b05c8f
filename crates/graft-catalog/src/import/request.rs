//! Import requests.

use crate::descriptor::{ConfigValue, FormatDescriptor};
use crate::error::{ImportError, ImportResult};

/// Configuration key holding the import options.
pub const IMPORT_KEY: &str = "import";

/// What a caller asked to import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    /// URI the table will be registered under.
    pub destination_uri: String,
    /// Whether the import group asked for an import at all.
    pub enabled: bool,
    /// Rebuild the physical metadata from the file alone.
    pub repair: bool,
    /// Metadata exported from the source instance.
    pub source_file_metadata: Option<FormatDescriptor>,
}

impl ImportRequest {
    /// Creates an enabled, non-repair request with no metadata.
    pub fn new(destination_uri: impl Into<String>) -> Self {
        Self {
            destination_uri: destination_uri.into(),
            enabled: true,
            repair: false,
            source_file_metadata: None,
        }
    }

    /// Sets repair mode.
    #[must_use]
    pub fn with_repair(mut self, repair: bool) -> Self {
        self.repair = repair;
        self
    }

    /// Supplies the source metadata.
    #[must_use]
    pub fn with_file_metadata(mut self, metadata: FormatDescriptor) -> Self {
        self.source_file_metadata = Some(metadata);
        self
    }

    /// Extracts the request from a table configuration.
    ///
    /// Returns `None` if the configuration has no `import` group. Otherwise
    /// returns the request and the destination configuration, which is the
    /// input with the `import` group removed.
    pub fn from_config(
        uri: &str,
        config: &FormatDescriptor,
    ) -> ImportResult<Option<(Self, FormatDescriptor)>> {
        let Some(value) = config.get(IMPORT_KEY) else {
            return Ok(None);
        };
        let group = value.as_group().ok_or_else(|| {
            ImportError::invalid_config(
                IMPORT_KEY,
                format!("expected (enabled=…,repair=…,file_metadata=(…)), found {}", value.kind()),
            )
        })?;

        let mut request = Self::new(uri);
        request.enabled = false;
        for (key, value) in group.iter() {
            match key {
                "enabled" => request.enabled = bool_option(key, value)?,
                "repair" => request.repair = bool_option(key, value)?,
                "file_metadata" => {
                    let metadata = match value {
                        ConfigValue::Group(g) => g.clone(),
                        ConfigValue::Str(s) => FormatDescriptor::parse(s)?,
                        other => {
                            return Err(ImportError::invalid_config(
                                "import.file_metadata",
                                format!("expected a group or string, found {}", other.kind()),
                            ))
                        }
                    };
                    request.source_file_metadata = Some(metadata);
                }
                other => {
                    return Err(ImportError::invalid_config(
                        format!("import.{}", other),
                        "unknown import option",
                    ))
                }
            }
        }

        let mut dest = config.clone();
        dest.remove(IMPORT_KEY);
        Ok(Some((request, dest)))
    }
}

fn bool_option(key: &str, value: &ConfigValue) -> ImportResult<bool> {
    value.as_bool().ok_or_else(|| {
        ImportError::invalid_config(
            format!("import.{}", key),
            format!("expected a boolean, found {}", value),
        )
    })
}
