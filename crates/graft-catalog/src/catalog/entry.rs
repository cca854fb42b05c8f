//! Catalog entries.

use serde::{Deserialize, Serialize};

use graft_common::types::FileId;

use crate::descriptor::{FormatDescriptor, ID_KEY};
use crate::error::ImportResult;
use crate::import::physical::is_physical_key;
use crate::schema::Schema;

/// How a table came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreatedVia {
    /// Created empty by this instance.
    Native,
    /// Attached from an existing data file.
    Imported,
}

/// Keys shown in the file-level metadata view besides the physical keys.
const FILE_VIEW_KEYS: [&str; 4] = ["key_format", "value_format", "app_metadata", ID_KEY];

/// A registered table.
///
/// Entries are immutable once committed; the checkpoint path replaces an
/// entry with a copy carrying the new generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Table URI, unique in the catalog.
    pub uri: String,
    /// Full table configuration, including the `id` key.
    pub config: FormatDescriptor,
    /// Id of the backing data file.
    pub backing_file_id: FileId,
    /// Whether the table was created or imported.
    pub created_via: CreatedVia,
    /// Generation of the last checkpoint written to the data file.
    pub checkpoint_generation: u64,
    /// Data file name relative to the data directory.
    pub file_name: String,
}

impl CatalogEntry {
    /// Renders the configuration exactly as stored.
    pub fn config_string(&self) -> String {
        self.config.render()
    }

    /// Returns the file-level view of the configuration: physical keys,
    /// formats, application metadata and id, in configuration order.
    pub fn file_view(&self) -> FormatDescriptor {
        self.config
            .iter()
            .filter(|(key, _)| is_physical_key(key) || FILE_VIEW_KEYS.contains(key))
            .map(|(key, value)| (key, value.clone()))
            .collect()
    }

    /// Parses the table's key and value layout.
    pub fn schema(&self) -> ImportResult<Schema> {
        Schema::from_config(&self.config)
    }

    /// Returns a copy recording a newer checkpoint.
    #[must_use]
    pub fn with_checkpoint_generation(&self, generation: u64) -> Self {
        Self {
            checkpoint_generation: generation,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> CatalogEntry {
        CatalogEntry {
            uri: "table:t".into(),
            config: FormatDescriptor::parse(
                "app_metadata=\"a,b\",columns=(k,v),key_format=S,value_format=S,\
                 allocation_size=4096,checksum=full,log=(enabled=false),id=4",
            )
            .unwrap(),
            backing_file_id: FileId::new(4),
            created_via: CreatedVia::Imported,
            checkpoint_generation: 2,
            file_name: "t.gft".into(),
        }
    }

    #[test]
    fn test_file_view() {
        assert_eq!(
            entry().file_view().render(),
            "app_metadata=\"a,b\",key_format=S,value_format=S,allocation_size=4096,\
             checksum=full,log=(enabled=false),id=4"
        );
    }

    #[test]
    fn test_config_string_verbatim() {
        let e = entry();
        assert_eq!(FormatDescriptor::parse(&e.config_string()).unwrap(), e.config);
    }

    #[test]
    fn test_with_checkpoint_generation() {
        let e = entry().with_checkpoint_generation(3);
        assert_eq!(e.checkpoint_generation, 3);
        assert_eq!(e.config, entry().config);
    }

    #[test]
    fn test_created_via_serde() {
        assert_eq!(serde_json::to_string(&CreatedVia::Imported).unwrap(), "\"imported\"");
    }
}
