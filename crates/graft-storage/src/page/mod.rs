//! Page layout for data files.
//!
//! Every tree page starts with a 32-byte [`PageHeader`] followed by its
//! payload, then zero padding up to a multiple of the file's allocation
//! size. The payload holds either leaf entries or internal child pointers
//! and may be block compressed.
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │ Page Header (32 bytes)                          │
//! ├─────────────────────────────────────────────────┤
//! │ Payload (payload_len bytes, maybe compressed)   │
//! ├─────────────────────────────────────────────────┤
//! │ Zero padding to the allocation unit             │
//! └─────────────────────────────────────────────────┘
//! ```

mod checksum;
mod header;
mod node;
mod types;

pub use checksum::{compute_checksum, compute_page_checksum, verify_checksum};
pub use header::{PageHeader, CHECKSUM_OFFSET};
pub use node::{
    decode_internal, decode_leaf, encode_internal, encode_leaf, InternalEntry, LeafEntry,
    VersionRecord, MAX_VERSIONS_PER_ENTRY,
};
pub use types::{PageFlags, PageType};

pub use graft_common::constants::{PAGE_HEADER_SIZE, PAGE_MAGIC};
