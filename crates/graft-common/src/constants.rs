//! System-wide constants for GraftDB.
//!
//! Format constants live here because both the writer side (checkpoints,
//! native table creation) and the reader side (probing, validation) must
//! agree on them byte for byte.

// =============================================================================
// Data File Format
// =============================================================================

/// Magic bytes at offset 0 of every data file.
pub const DATA_FILE_MAGIC: [u8; 8] = *b"GRFTDATA";

/// Data file format version written by this engine.
pub const DATA_FILE_FORMAT_VERSION: u32 = 1;

/// Oldest data file format version this engine can read.
pub const MIN_SUPPORTED_FORMAT_VERSION: u32 = 1;

/// Magic value stored in the first two bytes of every page header ("GF").
pub const PAGE_MAGIC: u16 = 0x4746;

/// Page header size in bytes.
pub const PAGE_HEADER_SIZE: usize = 32;

/// Space the descriptor block needs before padding.
///
/// The descriptor block always occupies one allocation unit, so the
/// smallest legal allocation size must hold it.
pub const DESCRIPTOR_BLOCK_MIN_SIZE: usize = 512;

/// Extension used for data files backing `table:` URIs.
pub const DATA_FILE_EXTENSION: &str = "gft";

/// Maximum depth of a page tree. Deeper trees are treated as corrupt.
pub const MAX_TREE_DEPTH: usize = 32;

// =============================================================================
// Allocation and Page Sizing
// =============================================================================

/// Smallest allocation unit (512 bytes).
pub const MIN_ALLOCATION_SIZE: u32 = 512;

/// Largest allocation unit (128 MB).
pub const MAX_ALLOCATION_SIZE: u32 = 128 * 1024 * 1024;

/// Default allocation unit (4 KB).
pub const DEFAULT_ALLOCATION_SIZE: u32 = 4 * 1024;

/// Default maximum internal page size (4 KB).
pub const DEFAULT_INTERNAL_PAGE_MAX: u32 = 4 * 1024;

/// Default maximum leaf page size (32 KB).
pub const DEFAULT_LEAF_PAGE_MAX: u32 = 32 * 1024;

/// Largest page size accepted in a configuration (512 MB).
pub const MAX_PAGE_SIZE: u32 = 512 * 1024 * 1024;

/// Default leaf key limit. Zero means no explicit limit.
pub const DEFAULT_LEAF_KEY_MAX: u32 = 0;

/// Default leaf value limit. Zero means no explicit limit.
pub const DEFAULT_LEAF_VALUE_MAX: u32 = 0;

// =============================================================================
// Catalog
// =============================================================================

/// Name of the durable catalog file inside the data directory.
pub const CATALOG_FILE_NAME: &str = "catalog.json";

/// URI scheme for logical tables.
pub const TABLE_URI_PREFIX: &str = "table:";

/// URI scheme for raw data files.
pub const FILE_URI_PREFIX: &str = "file:";

/// Catalog file format version.
pub const CATALOG_FORMAT_VERSION: u32 = 1;
