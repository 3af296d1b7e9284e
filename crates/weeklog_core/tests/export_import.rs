use rusqlite::Connection;
use serde_json::{json, Value};
use weeklog_core::db::{open_db_in_memory, DbError};
use weeklog_core::{
    Activity, ActivityDraft, ActivityId, ActivityList, AnnotationError, AnnotationKey,
    AnnotationKind, AnnotationResult, AnnotationStore, AnnotationValue, DayIndex,
    MemoryActivityList, MemoryAnnotationStore, ReconciliationEngine, RepoError, RepoResult,
    SqliteActivityRepository, SqliteAnnotationStore, TransferError, WeekKey, MAX_IMPORT_BYTES,
};

type MemoryEngine = ReconciliationEngine<MemoryActivityList, MemoryAnnotationStore>;

fn memory_engine() -> MemoryEngine {
    ReconciliationEngine::new(MemoryActivityList::new(), MemoryAnnotationStore::new())
}

fn key(kind: AnnotationKind, week: WeekKey, day: u8) -> AnnotationKey {
    AnnotationKey::new(kind, week, DayIndex::new(day).unwrap())
}

fn text(value: &str) -> AnnotationValue {
    AnnotationValue::Text(value.to_string())
}

fn seed_sqlite(conn: &Connection) -> Vec<Activity> {
    let activities = SqliteActivityRepository::try_new(conn).unwrap();
    let store = SqliteAnnotationStore::try_new(conn).unwrap();

    let created = vec![
        activities
            .create(
                ActivityDraft::new(10, 2024)
                    .with_field("title", "run")
                    .with_field("days", json!([true, false, true, false, false, false, false])),
            )
            .unwrap(),
        activities
            .create(ActivityDraft::new(11, 2024).with_field("title", "read"))
            .unwrap(),
        activities
            .create(
                ActivityDraft::new(10, 2024)
                    .with_field("title", "cook")
                    .with_field("category", json!({ "name": "home", "weight": 0.5 })),
            )
            .unwrap(),
    ];

    let week10 = WeekKey::new(10, 2024);
    let week11 = WeekKey::new(11, 2024);
    store
        .write(
            &key(AnnotationKind::PositiveNotes, week10, 0),
            &AnnotationValue::Structured(json!(["slept well", { "mood": 4 }])),
        )
        .unwrap();
    store
        .write(&key(AnnotationKind::FreeWriting, week10, 3), &text("long day"))
        .unwrap();
    store
        .write(&key(AnnotationKind::FreeWriting, week11, 6), &text("sunday"))
        .unwrap();

    created
}

/// Annotation store whose writes fail at the storage layer.
struct UnwritableStore(MemoryAnnotationStore);

impl AnnotationStore for UnwritableStore {
    fn read(&self, key: &AnnotationKey) -> AnnotationResult<Option<AnnotationValue>> {
        self.0.read(key)
    }

    fn write(&self, _key: &AnnotationKey, _value: &AnnotationValue) -> AnnotationResult<()> {
        Err(AnnotationError::Db(DbError::MissingTable("annotations")))
    }
}

/// Activity list that refuses to create activities titled `refused`.
struct PickyList(MemoryActivityList);

impl ActivityList for PickyList {
    fn list(&self) -> RepoResult<Vec<Activity>> {
        self.0.list()
    }

    fn create(&self, draft: ActivityDraft) -> RepoResult<Activity> {
        if draft.fields.get("title") == Some(&json!("refused")) {
            return Err(RepoError::InvalidData("title refused".to_string()));
        }
        self.0.create(draft)
    }

    fn remove(&self, id: ActivityId) -> RepoResult<()> {
        self.0.remove(id)
    }
}

/// Activity list whose removals fail.
struct StuckList(MemoryActivityList);

impl ActivityList for StuckList {
    fn list(&self) -> RepoResult<Vec<Activity>> {
        self.0.list()
    }

    fn create(&self, draft: ActivityDraft) -> RepoResult<Activity> {
        self.0.create(draft)
    }

    fn remove(&self, _id: ActivityId) -> RepoResult<()> {
        Err(RepoError::Db(DbError::MissingTable("activities")))
    }
}

fn dump_tables(conn: &Connection) -> Vec<String> {
    let mut rows = Vec::new();
    for sql in [
        "SELECT uuid || '|' || week_number || '|' || year || '|' || fields
         FROM activities ORDER BY rowid",
        "SELECT kind || '|' || week_number || '|' || year || '|' || day_index || '|' || value
         FROM annotations ORDER BY kind, year, week_number, day_index",
    ] {
        let mut stmt = conn.prepare(sql).unwrap();
        let mapped = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        rows.extend(mapped);
    }
    rows
}

#[test]
fn export_then_import_into_fresh_store_reproduces_everything() {
    let source = open_db_in_memory().unwrap();
    let originals = seed_sqlite(&source);
    let document = {
        let engine = ReconciliationEngine::new(
            SqliteActivityRepository::try_new(&source).unwrap(),
            SqliteAnnotationStore::try_new(&source).unwrap(),
        );
        engine.export_document().unwrap()
    };

    let target = open_db_in_memory().unwrap();
    let engine = ReconciliationEngine::new(
        SqliteActivityRepository::try_new(&target).unwrap(),
        SqliteAnnotationStore::try_new(&target).unwrap(),
    );
    let report = engine.unpack(&document).unwrap();
    assert_eq!(report.imported_count(), 3);
    assert!(report.skipped_records.is_empty());
    assert!(report.skipped_annotations.is_empty());

    let imported = engine.activities().list().unwrap();
    assert_eq!(imported.len(), originals.len());
    for (original, copy) in originals.iter().zip(&imported) {
        assert_ne!(original.id, copy.id);
        assert_eq!(original.week_key(), copy.week_key());
        assert_eq!(original.fields, copy.fields);
    }

    let source_store = SqliteAnnotationStore::try_new(&source).unwrap();
    for week in [WeekKey::new(10, 2024), WeekKey::new(11, 2024)] {
        for slot in AnnotationKey::all_for_week(week) {
            assert_eq!(
                engine.annotations().read(&slot).unwrap(),
                source_store.read(&slot).unwrap(),
                "slot {slot} differs after roundtrip"
            );
        }
    }
}

#[test]
fn export_record_is_flat_and_keeps_list_order() {
    let engine = memory_engine();
    let first = engine
        .activities()
        .create(ActivityDraft::new(5, 2025).with_field("title", "yoga"))
        .unwrap();
    let second = engine
        .activities()
        .create(ActivityDraft::new(4, 2025))
        .unwrap();
    let week = first.week_key();
    engine
        .annotations()
        .write(
            &key(AnnotationKind::PositiveNotes, week, 1),
            &AnnotationValue::Structured(json!({ "items": ["a"] })),
        )
        .unwrap();
    engine
        .annotations()
        .write(&key(AnnotationKind::FreeWriting, week, 1), &text("note"))
        .unwrap();

    let records = engine.pack().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(
        Value::Object(records[0].clone()),
        json!({
            "id": first.id.to_string(),
            "weekNumber": 5,
            "year": 2025,
            "title": "yoga",
            "positiveNotes-1": { "items": ["a"] },
            "freeWriting-1": "note"
        })
    );
    assert_eq!(records[1].get("id"), Some(&json!(second.id.to_string())));

    let document: Value = serde_json::from_str(&engine.export_document().unwrap()).unwrap();
    assert!(document.is_array());
    assert_eq!(document.as_array().unwrap().len(), 2);
}

#[test]
fn activity_without_annotations_roundtrips_without_writes() {
    let source = memory_engine();
    source
        .activities()
        .create(ActivityDraft::new(30, 2024).with_field("title", "quiet"))
        .unwrap();

    let records = source.pack().unwrap();
    let mut names: Vec<_> = records[0].keys().cloned().collect();
    names.sort();
    assert_eq!(names, vec!["id", "title", "weekNumber", "year"]);

    let target = memory_engine();
    let report = target
        .unpack(&source.export_document().unwrap())
        .unwrap();
    assert_eq!(report.imported_count(), 1);
    assert_eq!(report.annotations_written, 0);
    assert!(target.annotations().is_empty());

    let imported = target.activities().snapshot();
    assert_eq!(imported[0].fields.get("title"), Some(&json!("quiet")));
}

#[test]
fn non_json_input_leaves_both_stores_untouched() {
    let conn = open_db_in_memory().unwrap();
    seed_sqlite(&conn);
    let before = dump_tables(&conn);

    let engine = ReconciliationEngine::new(
        SqliteActivityRepository::try_new(&conn).unwrap(),
        SqliteAnnotationStore::try_new(&conn).unwrap(),
    );
    let err = engine.unpack("this is not json [").unwrap_err();

    assert!(matches!(err, TransferError::InvalidJson(_)));
    assert!(err.is_invalid_format());
    assert_eq!(dump_tables(&conn), before);
}

#[test]
fn non_array_input_leaves_both_stores_untouched() {
    let engine = memory_engine();
    engine
        .activities()
        .create(ActivityDraft::new(1, 2024))
        .unwrap();
    engine
        .annotations()
        .write(
            &key(AnnotationKind::FreeWriting, WeekKey::new(1, 2024), 0),
            &text("keep"),
        )
        .unwrap();
    let activities_before = engine.activities().snapshot();
    let annotations_before = engine.annotations().snapshot();

    for raw in [
        r#"{"weekNumber": 2, "year": 2024}"#,
        r#"[{"weekNumber": 2, "year": 2024}, "stray"]"#,
        "42",
    ] {
        let err = engine.unpack(raw).unwrap_err();
        assert!(matches!(err, TransferError::InvalidStructure(_)), "{raw}");
        assert_eq!(engine.activities().snapshot(), activities_before);
        assert_eq!(engine.annotations().snapshot(), annotations_before);
    }
}

#[test]
fn oversized_input_is_rejected_before_parsing() {
    let engine = memory_engine();
    engine
        .activities()
        .create(ActivityDraft::new(1, 2024))
        .unwrap();

    let raw = " ".repeat(MAX_IMPORT_BYTES + 1);
    let err = engine.unpack(&raw).unwrap_err();
    assert!(matches!(err, TransferError::InputTooLarge { .. }));
    assert_eq!(engine.activities().len(), 1);
}

#[test]
fn reserved_named_fields_always_become_annotations() {
    let engine = memory_engine();
    let raw = json!([{
        "weekNumber": 7,
        "year": 2024,
        "title": "write",
        "freeWriting-3": "this is an annotation",
        "freeWriting-7": "this is an ordinary field"
    }])
    .to_string();

    let report = engine.unpack(&raw).unwrap();
    assert_eq!(report.annotations_written, 1);

    let activity = &engine.activities().snapshot()[0];
    assert!(!activity.fields.contains_key("freeWriting-3"));
    assert_eq!(
        activity.fields.get("freeWriting-7"),
        Some(&json!("this is an ordinary field"))
    );
    assert_eq!(
        engine
            .annotations()
            .read(&key(AnnotationKind::FreeWriting, WeekKey::new(7, 2024), 3))
            .unwrap(),
        Some(text("this is an annotation"))
    );
}

#[test]
fn one_corrupted_stored_value_is_omitted_from_export_only() {
    let engine = memory_engine();
    let broken = engine
        .activities()
        .create(ActivityDraft::new(2, 2024).with_field("title", "broken week"))
        .unwrap();
    let healthy = engine
        .activities()
        .create(ActivityDraft::new(3, 2024).with_field("title", "healthy week"))
        .unwrap();

    engine
        .annotations()
        .insert_raw(key(AnnotationKind::PositiveNotes, broken.week_key(), 0), "{oops");
    engine
        .annotations()
        .write(
            &key(AnnotationKind::FreeWriting, broken.week_key(), 0),
            &text("survives"),
        )
        .unwrap();
    engine
        .annotations()
        .write(
            &key(AnnotationKind::PositiveNotes, healthy.week_key(), 5),
            &AnnotationValue::Structured(json!(["fine"])),
        )
        .unwrap();

    let outcome = engine.pack_detailed().unwrap();
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(
        outcome.omitted_fields,
        vec![(broken.id, "positiveNotes-0".to_string())]
    );
    assert!(!outcome.records[0].contains_key("positiveNotes-0"));
    assert_eq!(outcome.records[0].get("freeWriting-0"), Some(&json!("survives")));
    assert_eq!(outcome.records[1].get("positiveNotes-5"), Some(&json!(["fine"])));
}

#[test]
fn one_malformed_incoming_value_is_skipped_and_the_rest_imports() {
    let engine = memory_engine();
    let raw = json!([
        {
            "weekNumber": 1,
            "year": 2024,
            "freeWriting-2": 42,
            "freeWriting-4": "kept",
            "positiveNotes-4": ["kept too"]
        },
        { "weekNumber": 2, "year": 2024, "freeWriting-0": "second" }
    ])
    .to_string();

    let report = engine.unpack(&raw).unwrap();
    assert_eq!(report.imported_count(), 2);
    assert_eq!(report.annotations_written, 3);
    assert_eq!(report.skipped_annotations.len(), 1);
    assert_eq!(report.skipped_annotations[0].index, 0);
    assert_eq!(report.skipped_annotations[0].field, "freeWriting-2");

    let week1 = WeekKey::new(1, 2024);
    assert_eq!(
        engine
            .annotations()
            .read(&key(AnnotationKind::FreeWriting, week1, 2))
            .unwrap(),
        None
    );
    assert_eq!(
        engine
            .annotations()
            .read(&key(AnnotationKind::FreeWriting, WeekKey::new(2, 2024), 0))
            .unwrap(),
        Some(text("second"))
    );
}

#[test]
fn import_replaces_activities_but_keeps_unrelated_annotations() {
    let engine = memory_engine();
    let old = engine
        .activities()
        .create(ActivityDraft::new(40, 2023).with_field("title", "old"))
        .unwrap();
    let old_slot = key(AnnotationKind::FreeWriting, old.week_key(), 1);
    engine.annotations().write(&old_slot, &text("history")).unwrap();

    let raw = json!([
        { "id": "legacy-1", "weekNumber": 1, "year": 2024, "title": "new a" },
        { "id": "legacy-2", "weekNumber": 2, "year": 2024, "title": "new b" }
    ])
    .to_string();
    let report = engine.unpack(&raw).unwrap();

    assert_eq!(report.cleared, 1);
    let titles: Vec<_> = engine
        .activities()
        .snapshot()
        .iter()
        .map(|activity| activity.fields.get("title").cloned())
        .collect();
    assert_eq!(titles, vec![Some(json!("new a")), Some(json!("new b"))]);
    assert_eq!(
        engine.activities().snapshot()[0].id,
        report.imported[0],
        "reported ids follow input order"
    );
    assert_eq!(engine.annotations().read(&old_slot).unwrap(), Some(text("history")));
}

#[test]
fn invalid_records_are_skipped_without_aborting() {
    let engine = memory_engine();
    let raw = json!([
        { "year": 2024, "title": "no week", "freeWriting-0": "lost" },
        { "weekNumber": 60, "year": 2024 },
        { "weekNumber": 9, "year": 2024, "title": "ok" }
    ])
    .to_string();

    let report = engine.unpack(&raw).unwrap();
    assert_eq!(report.imported_count(), 1);
    let skipped: Vec<_> = report.skipped_records.iter().map(|s| s.index).collect();
    assert_eq!(skipped, vec![0, 1]);
    assert!(engine.annotations().is_empty());
    assert!(report.summary().contains("Imported 1 activities"));
}

#[test]
fn blank_incoming_annotations_are_not_written() {
    let engine = memory_engine();
    let raw = json!([{
        "weekNumber": 6,
        "year": 2024,
        "positiveNotes-0": null,
        "positiveNotes-1": "",
        "positiveNotes-2": 0,
        "freeWriting-3": "",
        "positiveNotes-4": []
    }])
    .to_string();

    let report = engine.unpack(&raw).unwrap();
    assert_eq!(report.annotations_written, 1);
    assert!(report.skipped_annotations.is_empty());
    assert_eq!(engine.annotations().len(), 1);
}

#[test]
fn pack_performs_no_writes() {
    let conn = open_db_in_memory().unwrap();
    seed_sqlite(&conn);
    let before = dump_tables(&conn);

    let engine = ReconciliationEngine::new(
        SqliteActivityRepository::try_new(&conn).unwrap(),
        SqliteAnnotationStore::try_new(&conn).unwrap(),
    );
    engine.pack().unwrap();
    engine.export_document().unwrap();

    assert_eq!(dump_tables(&conn), before);
}

#[test]
fn repeated_imports_leave_no_stale_activity_rows() {
    let conn = open_db_in_memory().unwrap();
    let engine = ReconciliationEngine::new(
        SqliteActivityRepository::try_new(&conn).unwrap(),
        SqliteAnnotationStore::try_new(&conn).unwrap(),
    );
    let raw = json!([
        { "weekNumber": 1, "year": 2024, "title": "a" },
        { "weekNumber": 2, "year": 2024, "title": "b" }
    ])
    .to_string();

    engine.unpack(&raw).unwrap();
    let second = engine.unpack(&raw).unwrap();
    assert_eq!(second.cleared, 2);

    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM activities;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 2);
    assert_eq!(engine.activities().list().unwrap().len(), 2);
}

#[test]
fn failed_annotation_writes_are_skipped_and_import_continues() {
    let engine = ReconciliationEngine::new(
        MemoryActivityList::new(),
        UnwritableStore(MemoryAnnotationStore::new()),
    );
    let raw = json!([
        { "weekNumber": 1, "year": 2024, "freeWriting-0": "lost" },
        { "weekNumber": 2, "year": 2024, "positiveNotes-6": ["lost too"] }
    ])
    .to_string();

    let report = engine.unpack(&raw).unwrap();
    assert_eq!(report.imported_count(), 2);
    assert_eq!(report.annotations_written, 0);
    let skipped: Vec<_> = report
        .skipped_annotations
        .iter()
        .map(|skipped| (skipped.index, skipped.field.as_str()))
        .collect();
    assert_eq!(skipped, vec![(0, "freeWriting-0"), (1, "positiveNotes-6")]);
    assert!(engine.annotations().0.is_empty());
}

#[test]
fn refused_create_becomes_a_skipped_record() {
    let engine = ReconciliationEngine::new(
        PickyList(MemoryActivityList::new()),
        MemoryAnnotationStore::new(),
    );
    let raw = json!([
        { "weekNumber": 3, "year": 2024, "title": "kept" },
        { "weekNumber": 4, "year": 2024, "title": "refused", "freeWriting-1": "dropped" },
        { "weekNumber": 5, "year": 2024, "title": "also kept" }
    ])
    .to_string();

    let report = engine.unpack(&raw).unwrap();
    assert_eq!(report.imported_count(), 2);
    assert_eq!(report.skipped_records.len(), 1);
    assert_eq!(report.skipped_records[0].index, 1);
    assert!(report.skipped_records[0].reason.contains("title refused"));
    assert!(engine.annotations().is_empty());
    assert!(report.summary().contains("Skipped 1 invalid entries"));
}

#[test]
fn failed_clear_aborts_before_anything_is_created() {
    let engine = ReconciliationEngine::new(
        StuckList(MemoryActivityList::new()),
        MemoryAnnotationStore::new(),
    );
    engine
        .activities()
        .create(ActivityDraft::new(8, 2024).with_field("title", "old"))
        .unwrap();
    let before = engine.activities().0.snapshot();

    let raw = json!([{ "weekNumber": 9, "year": 2024, "freeWriting-2": "new" }]).to_string();
    let err = engine.unpack(&raw).unwrap_err();

    assert!(matches!(err, TransferError::Activity(RepoError::Db(_))));
    assert!(!err.is_invalid_format());
    assert_eq!(engine.activities().0.snapshot(), before);
    assert!(engine.annotations().is_empty());
}

#[test]
fn stored_structured_falsy_values_are_exported() {
    let engine = memory_engine();
    let activity = engine
        .activities()
        .create(ActivityDraft::new(12, 2024))
        .unwrap();
    let week = activity.week_key();
    engine
        .annotations()
        .insert_raw(key(AnnotationKind::PositiveNotes, week, 0), "null");
    engine
        .annotations()
        .insert_raw(key(AnnotationKind::PositiveNotes, week, 1), "0");
    engine
        .annotations()
        .insert_raw(key(AnnotationKind::FreeWriting, week, 2), "");

    let records = engine.pack().unwrap();
    assert_eq!(records[0].get("positiveNotes-0"), Some(&Value::Null));
    assert_eq!(records[0].get("positiveNotes-1"), Some(&json!(0)));
    assert!(!records[0].contains_key("freeWriting-2"));
}

#[test]
fn activities_sharing_a_week_count_each_annotation_once() {
    let engine = memory_engine();
    let raw = json!([
        { "weekNumber": 10, "year": 2024, "title": "a", "freeWriting-1": "same" },
        { "weekNumber": 10, "year": 2024, "title": "b", "freeWriting-1": "same" },
        { "weekNumber": 10, "year": 2024, "title": "c", "freeWriting-1": "same" }
    ])
    .to_string();

    let report = engine.unpack(&raw).unwrap();
    assert_eq!(report.imported_count(), 3);
    assert_eq!(report.annotations_written, 1);
    assert_eq!(engine.annotations().len(), 1);
}
