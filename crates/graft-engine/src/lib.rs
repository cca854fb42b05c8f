//! # graft-engine
//!
//! The GraftDB engine: a database directory of tables, each held in memory
//! as timestamped version chains and persisted by checkpoints as a single
//! data file.
//!
//! Tables come into being in two ways. A native create writes an empty data
//! file; a live import attaches a data file exported from another instance,
//! after checking its metadata and walking its page tree.
//!
//! ## Example
//!
//! ```rust,no_run
//! use graft_common::config::EngineConfig;
//! use graft_common::types::Timestamp;
//! use graft_engine::Database;
//!
//! let db = Database::open(EngineConfig::with_data_dir("/tmp/graft"))?;
//! let session = db.session();
//! session.create("table:t", "key_format=S,value_format=S")?;
//!
//! let cursor = session.open_cursor("table:t")?;
//! cursor.insert_row(&["1".into()], &["A".into()], Timestamp::new(10))?;
//! session.checkpoint()?;
//!
//! // Hand the data file and this string to another instance.
//! let exported = session.metadata("table:t")?;
//! # let _ = exported;
//! db.close()?;
//! # Ok::<(), graft_engine::EngineError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod database;
pub mod error;
pub mod table;

pub use checkpoint::{CheckpointInfo, CheckpointManager, CheckpointState};
pub use database::{Database, DatabaseStats, Session, SessionId};
pub use error::{EngineError, EngineResult};
pub use table::{Cursor, Datum, Table};
