//! Live import integration tests.
//!
//! Each test builds a table in a source directory, copies its data file
//! into a destination directory and attaches it there.

use std::sync::Barrier;
use std::thread;

use tempfile::TempDir;

use graft_catalog::{CreatedVia, FormatDescriptor, ImportError, ImportState};
use graft_common::error::ErrorCode;
use graft_engine::{Datum, EngineError};
use graft_test::utils::{
    build_source, copy_data_file, cstr, first_page_offset, flip_byte, import_config, open_db, ts,
    Op,
};

const STRINGS: &str = "key_format=S,value_format=S";

fn four_rows() -> Vec<Op<'static>> {
    vec![
        Op::Put("1", "A", 10),
        Op::Put("2", "B", 20),
        Op::Checkpoint,
        Op::Put("3", "C", 30),
        Op::Put("4", "D", 40),
        Op::Checkpoint,
    ]
}

fn import_error(err: &EngineError) -> &ImportError {
    err.as_import()
        .unwrap_or_else(|| panic!("expected an import error, got {:?}", err))
}

#[test]
fn test_four_row_round_trip() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let exported = build_source(src.path(), "table:t", STRINGS, &four_rows()).unwrap();
    copy_data_file(src.path(), dst.path(), "t.gft").unwrap();

    let db = open_db(dst.path()).unwrap();
    let session = db.session();
    // Occupy id 1 so the import is assigned a different one.
    session.create("table:other", "").unwrap();
    session.create("table:t", &import_config(&exported)).unwrap();

    let report = session.verify("table:t").unwrap();
    assert_eq!(report.entries, 4);
    assert_eq!(report.newest_timestamp, ts(40));

    let imported = session.metadata("table:t").unwrap();
    assert_ne!(imported, exported);
    let imported = FormatDescriptor::parse(&imported).unwrap();
    let original = FormatDescriptor::parse(&exported).unwrap();
    assert!(imported.equivalent(&original));
    assert_eq!(imported.get_int("id"), Some(2));
    assert_eq!(
        db.catalog().get("table:t").unwrap().created_via,
        CreatedVia::Imported
    );

    let cursor = session.open_cursor("table:t").unwrap();
    assert_eq!(cursor.search(&cstr("1"), ts(10)).as_deref(), Some(&cstr("A")[..]));
    assert_eq!(cursor.search(&cstr("3"), ts(20)), None);
    assert_eq!(cursor.search(&cstr("3"), ts(30)).as_deref(), Some(&cstr("C")[..]));
    let rows = cursor.scan_rows(ts(40)).unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[3], vec![Datum::from("4"), Datum::from("D")]);

    cursor
        .insert_row(&[Datum::from("5")], &[Datum::from("E")], ts(50))
        .unwrap();
    session.checkpoint().unwrap();
    assert_eq!(session.verify("table:t").unwrap().entries, 5);
    db.close().unwrap();
    drop(db);

    let db = open_db(dst.path()).unwrap();
    let cursor = db.session().open_cursor("table:t").unwrap();
    assert_eq!(cursor.scan(ts(50)).len(), 5);
    assert_eq!(cursor.scan(ts(45)).len(), 4);
}

#[test]
fn test_corrupt_page_leaves_catalog_unchanged() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let exported = build_source(src.path(), "table:t", STRINGS, &four_rows()).unwrap();
    let path = copy_data_file(src.path(), dst.path(), "t.gft").unwrap();
    let page = first_page_offset(&path).unwrap();
    flip_byte(&path, page + 40).unwrap();

    let db = open_db(dst.path()).unwrap();
    let session = db.session();
    session.create("table:other", "").unwrap();
    let before = std::fs::read(dst.path().join("catalog.json")).unwrap();
    let tables_before = db.catalog().len();

    let err = session.create("table:t", &import_config(&exported)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CorruptImport);
    match import_error(&err) {
        ImportError::CorruptImport { offset, .. } => assert_eq!(*offset, Some(page)),
        other => panic!("unexpected error {:?}", other),
    }

    assert_eq!(std::fs::read(dst.path().join("catalog.json")).unwrap(), before);
    assert_eq!(db.catalog().len(), tables_before);
    assert!(db.table("table:t").is_none());
    assert!(matches!(
        session.metadata("table:t"),
        Err(EngineError::TableNotFound { .. })
    ));
}

#[test]
fn test_concurrent_imports_of_one_uri() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let exported = build_source(src.path(), "table:t", STRINGS, &four_rows()).unwrap();
    copy_data_file(src.path(), dst.path(), "t.gft").unwrap();

    let db = open_db(dst.path()).unwrap();
    let config = import_config(&exported);
    let barrier = Barrier::new(2);
    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    db.session().create("table:t", &config)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let losers: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(losers.len(), 1);
    assert_eq!(losers[0].code(), ErrorCode::NameConflict);
    assert_eq!(db.catalog().len(), 1);
}

#[test]
fn test_repair_mode_takes_physical_keys_from_file() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let config = "key_format=S,value_format=S,allocation_size=8KB,internal_page_max=8KB,\
                  leaf_page_max=64KB,block_compressor=snappy,checksum=full";
    let exported = build_source(src.path(), "table:t", config, &four_rows()).unwrap();
    copy_data_file(src.path(), dst.path(), "t.gft").unwrap();

    let db = open_db(dst.path()).unwrap();
    let session = db.session();
    let outcome = session.live_import("table:t", None).unwrap();
    assert_eq!(outcome.report.entries, 4);
    assert_eq!(outcome.states.last(), Some(&ImportState::Committed));

    let repaired = FormatDescriptor::parse(&session.metadata("table:t").unwrap()).unwrap();
    let original = FormatDescriptor::parse(&exported).unwrap();
    for key in [
        "allocation_size",
        "internal_page_max",
        "leaf_page_max",
        "block_compressor",
        "checksum",
        "key_format",
        "value_format",
    ] {
        assert_eq!(repaired.get(key), original.get(key), "key {}", key);
    }
    let cursor = session.open_cursor("table:t").unwrap();
    assert_eq!(cursor.search(&cstr("2"), ts(40)).as_deref(), Some(&cstr("B")[..]));
}

#[test]
fn test_live_import_with_exported_metadata() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let exported = build_source(src.path(), "table:t", STRINGS, &four_rows()).unwrap();
    copy_data_file(src.path(), dst.path(), "t.gft").unwrap();

    let db = open_db(dst.path()).unwrap();
    let outcome = db.session().live_import("table:t", Some(&exported)).unwrap();
    assert_eq!(
        outcome.states,
        vec![
            ImportState::Requested,
            ImportState::Probed,
            ImportState::Reconciled,
            ImportState::Validated,
            ImportState::Committed,
        ]
    );
    assert!(outcome.entry.config.equivalent(&FormatDescriptor::parse(&exported).unwrap()));
}

#[test]
fn test_missing_metadata_without_repair() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    build_source(src.path(), "table:t", STRINGS, &four_rows()).unwrap();
    copy_data_file(src.path(), dst.path(), "t.gft").unwrap();

    let db = open_db(dst.path()).unwrap();
    let err = db
        .session()
        .create("table:t", "import=(enabled=true)")
        .unwrap_err();
    assert!(matches!(import_error(&err), ImportError::MissingMetadata { .. }));
    assert!(db.catalog().is_empty());
}

#[test]
fn test_conflicting_metadata() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let exported = build_source(src.path(), "table:t", STRINGS, &four_rows()).unwrap();
    copy_data_file(src.path(), dst.path(), "t.gft").unwrap();

    let mut wrong = FormatDescriptor::parse(&exported).unwrap();
    wrong.set("allocation_size", 65536i64);
    let wrong = wrong.render();

    let db = open_db(dst.path()).unwrap();
    let err = db
        .session()
        .create(
            "table:t",
            &format!("{},import=(enabled=true,file_metadata=({}))", exported, wrong),
        )
        .unwrap_err();
    match import_error(&err) {
        ImportError::SchemaConflict { key, .. } => assert_eq!(key, "allocation_size"),
        other => panic!("unexpected error {:?}", other),
    }

    let err = db
        .session()
        .create("table:t", &format!("{},import=(enabled=true,file_metadata=({}))", wrong, exported))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::SchemaConflict);
}

#[test]
fn test_file_already_backing_a_table() {
    let dir = TempDir::new().unwrap();
    let db = open_db(dir.path()).unwrap();
    let session = db.session();
    session.create("table:t", STRINGS).unwrap();

    let err = session.live_import("file:t.gft", None).unwrap_err();
    assert!(matches!(import_error(&err), ImportError::FileInUse { .. }));
}

#[test]
fn test_history_survives_import() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let ops = [
        Op::Put("k", "v1", 10),
        Op::Put("k", "v2", 20),
        Op::Remove("k", 30),
        Op::Put("j", "w", 25),
        Op::Checkpoint,
    ];
    let exported = build_source(src.path(), "table:t", STRINGS, &ops).unwrap();
    copy_data_file(src.path(), dst.path(), "t.gft").unwrap();

    let db = open_db(dst.path()).unwrap();
    let session = db.session();
    session.create("table:t", &import_config(&exported)).unwrap();
    let cursor = session.open_cursor("table:t").unwrap();

    assert_eq!(cursor.search(&cstr("k"), ts(5)), None);
    assert_eq!(cursor.search(&cstr("k"), ts(15)).as_deref(), Some(&cstr("v1")[..]));
    assert_eq!(cursor.search(&cstr("k"), ts(25)).as_deref(), Some(&cstr("v2")[..]));
    assert_eq!(cursor.search(&cstr("k"), ts(35)), None);
    assert_eq!(cursor.scan(ts(35)).len(), 1);

    let err = cursor.insert(&cstr("k"), &cstr("late"), ts(28)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::TimestampOutOfOrder);
    cursor.insert(&cstr("k"), &cstr("v3"), ts(40)).unwrap();
    assert_eq!(cursor.search(&cstr("k"), ts(40)).as_deref(), Some(&cstr("v3")[..]));
}

#[test]
fn test_file_view_matches_source() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let config = "key_format=S,value_format=S,app_metadata=\"owner=ops\",columns=(k,v)";
    let exported = build_source(src.path(), "table:t", config, &four_rows()).unwrap();
    copy_data_file(src.path(), dst.path(), "t.gft").unwrap();

    let src_view = {
        let db = open_db(src.path()).unwrap();
        let view = db.session().metadata("file:t.gft").unwrap();
        db.close().unwrap();
        view
    };

    let db = open_db(dst.path()).unwrap();
    let session = db.session();
    session.create("table:t", &import_config(&exported)).unwrap();
    let dst_view = session.metadata("file:t.gft").unwrap();

    let src_view = FormatDescriptor::parse(&src_view).unwrap();
    let dst_view = FormatDescriptor::parse(&dst_view).unwrap();
    assert!(src_view.equivalent(&dst_view));
    assert!(!dst_view.contains("columns"));
    assert_eq!(dst_view.get_str("app_metadata"), Some("owner=ops"));

    let projected = session.open_cursor("table:t(v)").unwrap();
    assert_eq!(
        projected.search_row(&[Datum::from("2")], ts(40)).unwrap(),
        Some(vec![Datum::from("B")])
    );
}

#[test]
fn test_stable_timestamp_bounds_import() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let exported = build_source(src.path(), "table:t", STRINGS, &four_rows()).unwrap();
    copy_data_file(src.path(), dst.path(), "t.gft").unwrap();

    let db = open_db(dst.path()).unwrap();
    db.set_stable_timestamp(ts(30));
    let err = db
        .session()
        .create("table:t", &import_config(&exported))
        .unwrap_err();
    match import_error(&err) {
        ImportError::TimestampsPastStable { newest, stable, .. } => {
            assert_eq!(*newest, ts(40));
            assert_eq!(*stable, ts(30));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(db.catalog().is_empty());

    db.set_stable_timestamp(ts(40));
    db.session().create("table:t", &import_config(&exported)).unwrap();
}

#[test]
fn test_stable_timestamp_bounds_deletes() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let ops = [
        Op::Put("1", "A", 10),
        Op::Checkpoint,
        Op::Remove("1", 20),
        Op::Checkpoint,
    ];
    let exported = build_source(src.path(), "table:t", STRINGS, &ops).unwrap();
    copy_data_file(src.path(), dst.path(), "t.gft").unwrap();

    let db = open_db(dst.path()).unwrap();
    db.set_stable_timestamp(ts(10));
    let err = db
        .session()
        .create("table:t", &import_config(&exported))
        .unwrap_err();
    match import_error(&err) {
        ImportError::TimestampsPastStable { newest, stable, .. } => {
            assert_eq!(*newest, ts(20));
            assert_eq!(*stable, ts(10));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(db.catalog().is_empty());

    db.set_stable_timestamp(ts(20));
    db.session().create("table:t", &import_config(&exported)).unwrap();
    let cursor = db.session().open_cursor("table:t").unwrap();
    assert_eq!(cursor.search(&cstr("1"), ts(15)).as_deref(), Some(&cstr("A")[..]));
    assert_eq!(cursor.search(&cstr("1"), ts(20)), None);
}

#[test]
fn test_interrupted_import_can_be_retried() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let exported = build_source(src.path(), "table:t", STRINGS, &four_rows()).unwrap();
    copy_data_file(src.path(), dst.path(), "t.gft").unwrap();

    let db = open_db(dst.path()).unwrap();
    db.interrupt();
    let err = db
        .session()
        .create("table:t", &import_config(&exported))
        .unwrap_err();
    let import = import_error(&err);
    assert!(matches!(import, ImportError::Interrupted { .. }));
    assert!(import.is_retryable());
    assert!(db.catalog().is_empty());

    db.clear_interrupt();
    db.session().create("table:t", &import_config(&exported)).unwrap();
}

#[test]
fn test_multi_level_tree_import() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let config = "key_format=S,value_format=S,allocation_size=512,internal_page_max=512,leaf_page_max=512";
    let keys: Vec<String> = (0..400).map(|i| format!("key{:05}", i)).collect();
    let mut ops: Vec<Op<'_>> = keys
        .iter()
        .enumerate()
        .map(|(i, k)| Op::Put(k.as_str(), "value", 10 + i as u64))
        .collect();
    ops.push(Op::Checkpoint);
    let exported = build_source(src.path(), "table:t", config, &ops).unwrap();
    copy_data_file(src.path(), dst.path(), "t.gft").unwrap();

    let db = open_db(dst.path()).unwrap();
    let outcome = db
        .session()
        .live_import("table:t", Some(&exported))
        .unwrap();
    assert_eq!(outcome.report.entries, 400);
    assert!(outcome.report.internal_pages > 0);
    assert!(outcome.report.max_depth >= 2);
    assert_eq!(outcome.report.newest_timestamp, ts(409));
}

#[test]
fn test_import_then_native_create_of_same_uri() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let exported = build_source(src.path(), "table:t", STRINGS, &four_rows()).unwrap();
    copy_data_file(src.path(), dst.path(), "t.gft").unwrap();

    let db = open_db(dst.path()).unwrap();
    let session = db.session();
    session.create("table:t", &import_config(&exported)).unwrap();
    let err = session.create("table:t", STRINGS).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NameConflict);
    let err = session.create("table:t", &import_config(&exported)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NameConflict);
}
