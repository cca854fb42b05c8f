use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use graft_common::config::EngineConfig;
use graft_common::types::Timestamp;
use graft_engine::{Database, EngineResult};
use graft_storage::{DataFileReader, StorageResult};

/// Shorthand for a commit or read timestamp.
pub fn ts(v: u64) -> Timestamp {
    Timestamp::new(v)
}

/// Engine configuration rooted at `dir`.
pub fn engine_config(dir: &Path) -> EngineConfig {
    EngineConfig::with_data_dir(dir)
}

/// Opens (or creates) a database in `dir`.
pub fn open_db(dir: &Path) -> EngineResult<Database> {
    Database::open(engine_config(dir))
}

/// One step applied to a source table.
#[derive(Debug, Clone, Copy)]
pub enum Op<'a> {
    /// Insert or overwrite.
    Put(&'a str, &'a str, u64),
    /// Delete.
    Remove(&'a str, u64),
    /// Checkpoint everything written so far.
    Checkpoint,
}

/// Builds a table in `dir`, applies `writes`, closes the database and
/// returns the table's exported configuration.
///
/// Keys and values are written as NUL-terminated strings so the table can
/// be declared `key_format=S,value_format=S`.
pub fn build_source(dir: &Path, uri: &str, config: &str, ops: &[Op<'_>]) -> EngineResult<String> {
    let db = open_db(dir)?;
    let session = db.session();
    session.create(uri, config)?;
    let cursor = session.open_cursor(uri)?;
    for op in ops {
        match *op {
            Op::Put(k, v, t) => cursor.insert(&cstr(k), &cstr(v), ts(t))?,
            Op::Remove(k, t) => {
                cursor.remove(&cstr(k), ts(t))?;
            }
            Op::Checkpoint => {
                session.checkpoint()?;
            }
        }
    }
    let exported = session.metadata(uri)?;
    db.close()?;
    Ok(exported)
}

/// Encodes a string the way an `S` field stores it.
pub fn cstr(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() + 1);
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    out
}

/// Builds the create configuration that imports with exported metadata.
pub fn import_config(exported: &str) -> String {
    format!("{},import=(enabled=true,file_metadata=({}))", exported, exported)
}

/// Copies a data file between directories, returning the destination path.
pub fn copy_data_file(src_dir: &Path, dst_dir: &Path, file_name: &str) -> io::Result<PathBuf> {
    let dst = dst_dir.join(file_name);
    std::fs::copy(src_dir.join(file_name), &dst)?;
    Ok(dst)
}

/// Inverts one byte of a file in place.
pub fn flip_byte(path: &Path, offset: u64) -> io::Result<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let mut byte = [0u8; 1];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut byte)?;
    byte[0] = !byte[0];
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(&byte)?;
    file.sync_all()
}

/// Offset of the first page after the descriptor block.
pub fn first_page_offset(path: &Path) -> StorageResult<u64> {
    let reader = DataFileReader::open(path)?;
    Ok(u64::from(reader.metadata().allocation_size))
}
