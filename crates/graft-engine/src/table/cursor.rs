//! Table cursors.

use std::sync::Arc;

use bytes::Bytes;

use graft_catalog::Schema;
use graft_common::types::Timestamp;

use super::format::{pack, unpack, Datum};
use super::Table;
use crate::error::{EngineError, EngineResult};

/// Reads and writes one table.
///
/// Raw methods take packed keys and values; the `_row` methods pack and
/// unpack through the table's formats. A cursor opened on
/// `table:name(col,…)` returns only the named columns from row reads.
/// Writes always take the full key and value.
#[derive(Debug, Clone)]
pub struct Cursor {
    table: Arc<Table>,
    uri: String,
    schema: Schema,
    projection: Option<Vec<usize>>,
    key_limit: Option<usize>,
    value_limit: Option<usize>,
}

impl Cursor {
    pub(crate) fn new(table: Arc<Table>, projection: Option<&[&str]>) -> EngineResult<Self> {
        let uri = table.uri();
        let schema = table.schema()?;
        let projection = match projection {
            None => None,
            Some(columns) => Some(
                columns
                    .iter()
                    .map(|column| {
                        schema.column_index(column).ok_or_else(|| EngineError::ColumnNotFound {
                            uri: uri.clone(),
                            column: column.to_string(),
                        })
                    })
                    .collect::<EngineResult<Vec<_>>>()?,
            ),
        };
        let sizing = table.metadata().page_sizing;
        Ok(Self {
            table,
            uri,
            schema,
            projection,
            key_limit: sizing.key_limit(),
            value_limit: sizing.value_limit(),
        })
    }

    /// URI of the table, without projection.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The table's schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn check_limits(&self, key: &[u8], value: Option<&[u8]>) -> EngineResult<()> {
        if let Some(max) = self.key_limit {
            if key.len() > max {
                return Err(EngineError::KeyTooLarge {
                    uri: self.uri.clone(),
                    size: key.len(),
                    max,
                });
            }
        }
        if let (Some(max), Some(value)) = (self.value_limit, value) {
            if value.len() > max {
                return Err(EngineError::ValueTooLarge {
                    uri: self.uri.clone(),
                    size: value.len(),
                    max,
                });
            }
        }
        Ok(())
    }

    /// Writes `value` under `key` at `commit_ts`.
    pub fn insert(&self, key: &[u8], value: &[u8], commit_ts: Timestamp) -> EngineResult<()> {
        self.check_limits(key, Some(value))?;
        self.table.store().put(
            Bytes::copy_from_slice(key),
            Bytes::copy_from_slice(value),
            commit_ts,
        )?;
        Ok(())
    }

    /// Deletes `key` at `commit_ts`. Returns false if the row did not exist.
    pub fn remove(&self, key: &[u8], commit_ts: Timestamp) -> EngineResult<bool> {
        self.check_limits(key, None)?;
        Ok(self.table.store().delete(key, commit_ts)?)
    }

    /// Reads the value of `key` visible at `read_ts`.
    pub fn search(&self, key: &[u8], read_ts: Timestamp) -> Option<Bytes> {
        self.table.store().get(key, read_ts)
    }

    /// Every row visible at `read_ts`, in key order.
    pub fn scan(&self, read_ts: Timestamp) -> Vec<(Bytes, Bytes)> {
        self.table.store().scan(read_ts)
    }

    /// Packs and writes a typed row.
    pub fn insert_row(&self, key: &[Datum], value: &[Datum], commit_ts: Timestamp) -> EngineResult<()> {
        let key = pack(&self.schema.key_fields, key)?;
        let value = pack(&self.schema.value_fields, value)?;
        self.insert(&key, &value, commit_ts)
    }

    /// Deletes a typed key.
    pub fn remove_row(&self, key: &[Datum], commit_ts: Timestamp) -> EngineResult<bool> {
        let key = pack(&self.schema.key_fields, key)?;
        self.remove(&key, commit_ts)
    }

    /// Reads a typed row.
    ///
    /// Without a projection this returns the value fields; with one, the
    /// projected columns drawn from key and value fields alike.
    pub fn search_row(&self, key: &[Datum], read_ts: Timestamp) -> EngineResult<Option<Vec<Datum>>> {
        let packed = pack(&self.schema.key_fields, key)?;
        let Some(value) = self.search(&packed, read_ts) else {
            return Ok(None);
        };
        let value = unpack(&self.schema.value_fields, &value)?;
        match &self.projection {
            None => Ok(Some(value)),
            Some(_) => Ok(Some(self.project(key.to_vec(), value))),
        }
    }

    /// Every row visible at `read_ts` as key fields followed by value
    /// fields, or as the projected columns.
    pub fn scan_rows(&self, read_ts: Timestamp) -> EngineResult<Vec<Vec<Datum>>> {
        self.scan(read_ts)
            .into_iter()
            .map(|(key, value)| {
                let key = unpack(&self.schema.key_fields, &key)?;
                let value = unpack(&self.schema.value_fields, &value)?;
                Ok(self.project(key, value))
            })
            .collect()
    }

    fn project(&self, key: Vec<Datum>, value: Vec<Datum>) -> Vec<Datum> {
        let mut row = key;
        row.extend(value);
        match &self.projection {
            None => row,
            Some(indexes) => indexes.iter().filter_map(|i| row.get(*i).cloned()).collect(),
        }
    }
}

/// Splits `table:name(col_a,col_b)` into the URI and its columns.
pub(crate) fn split_projection(uri: &str) -> (&str, Option<Vec<&str>>) {
    match (uri.find('('), uri.strip_suffix(')')) {
        (Some(open), Some(inner)) if open < inner.len() => {
            let columns = inner[open + 1..]
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .collect();
            (&uri[..open], Some(columns))
        }
        _ => (uri, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_catalog::{CatalogEntry, CreatedVia, FormatDescriptor};
    use graft_common::types::FileId;
    use graft_storage::{FileMetadata, PageSizing};

    fn ts(v: u64) -> Timestamp {
        Timestamp::new(v)
    }

    fn table(config: &str, sizing: Option<PageSizing>) -> Arc<Table> {
        let entry = CatalogEntry {
            uri: "table:t".into(),
            config: FormatDescriptor::parse(config).unwrap(),
            backing_file_id: FileId::new(1),
            created_via: CreatedVia::Native,
            checkpoint_generation: 1,
            file_name: "t.gft".into(),
        };
        let mut meta = FileMetadata::new(FileId::new(1));
        if let Some(sizing) = sizing {
            meta = meta.with_page_sizing(sizing);
        }
        Arc::new(Table::new(Arc::new(entry), meta, Vec::new(), "t.gft".into()))
    }

    #[test]
    fn test_raw_insert_search_remove() {
        let cursor = Cursor::new(table("", None), None).unwrap();
        cursor.insert(b"1", b"A", ts(10)).unwrap();
        cursor.insert(b"2", b"B", ts(20)).unwrap();
        assert!(cursor.remove(b"1", ts(30)).unwrap());
        assert!(!cursor.remove(b"9", ts(30)).unwrap());

        assert_eq!(cursor.search(b"1", ts(25)).as_deref(), Some(&b"A"[..]));
        assert_eq!(cursor.search(b"1", ts(30)), None);
        assert_eq!(cursor.scan(ts(40)).len(), 1);
    }

    #[test]
    fn test_limits_enforced() {
        let sizing = PageSizing {
            leaf_key_max: 4,
            leaf_value_max: 8,
            ..FileMetadata::new(FileId::new(1)).page_sizing
        };
        let cursor = Cursor::new(table("", Some(sizing)), None).unwrap();
        assert!(matches!(
            cursor.insert(b"toolong", b"v", ts(1)),
            Err(EngineError::KeyTooLarge { size: 7, max: 4, .. })
        ));
        assert!(matches!(
            cursor.insert(b"k", b"much too long", ts(1)),
            Err(EngineError::ValueTooLarge { max: 8, .. })
        ));
        cursor.insert(b"k", b"fits", ts(1)).unwrap();
    }

    #[test]
    fn test_typed_rows_and_projection() {
        let config = "key_format=S,value_format=iS,columns=(id,n,name)";
        let t = table(config, None);
        let cursor = Cursor::new(t.clone(), None).unwrap();
        cursor
            .insert_row(&[Datum::from("a")], &[Datum::Int(1), Datum::from("one")], ts(5))
            .unwrap();
        assert_eq!(
            cursor.search_row(&[Datum::from("a")], ts(5)).unwrap(),
            Some(vec![Datum::Int(1), Datum::from("one")])
        );

        let projected = Cursor::new(t, Some(&["name", "id"][..])).unwrap();
        assert_eq!(
            projected.scan_rows(ts(5)).unwrap(),
            vec![vec![Datum::from("one"), Datum::from("a")]]
        );
        assert_eq!(
            projected.search_row(&[Datum::from("a")], ts(4)).unwrap(),
            None
        );
    }

    #[test]
    fn test_unknown_projection_column() {
        let t = table("key_format=S,value_format=S,columns=(k,v)", None);
        assert!(matches!(
            Cursor::new(t, Some(&["missing"][..])),
            Err(EngineError::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_split_projection() {
        assert_eq!(split_projection("table:t"), ("table:t", None));
        assert_eq!(
            split_projection("table:t(a, b)"),
            ("table:t", Some(vec!["a", "b"]))
        );
    }
}
